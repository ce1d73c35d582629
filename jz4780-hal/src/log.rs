//! # Logging providers
//!
//! The drivers of this crate log through the [log] facade: `trace` for state machine
//! transitions and register sequences, `debug` for configuration results and `warn` for
//! verification failures and unexpected interrupts. Any [log::Log] implementation can be
//! installed by the application. This module provides one which does not need a console
//! driver.
use core::sync::atomic::AtomicBool;

static LOGGER_INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Logger module which logs into a ring buffer to allow asynchronous logging handling.
///
/// Log calls only format into a static buffer and push the bytes into a ring buffer. The
/// length of each frame is sent through a channel, so a low priority task can forward the
/// frames to a console at its own pace.
pub mod rb {
    use core::cell::RefCell;
    use core::fmt::Write as _;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use log::{LevelFilter, SetLoggerError, set_logger, set_max_level};
    use ringbuf::{
        StaticRb,
        traits::{Consumer, Observer, Producer},
    };

    pub const DATA_BUF_SIZE: usize = 1024;
    pub const RING_BUF_SIZE: usize = 4096;
    pub const FRAME_QUEUE_DEPTH: usize = 32;

    pub type FrameQueue =
        embassy_sync::channel::Channel<CriticalSectionRawMutex, usize, FRAME_QUEUE_DEPTH>;

    /// Logger implementation which logs frames via a ring buffer and sends the frame sizes
    /// as messages.
    ///
    /// Frames are formatted as `[<target>] <level> - <message>`. A frame which does not fit
    /// into the ring buffer any more is dropped as a whole.
    pub struct Logger {
        frame_queue: FrameQueue,
        data_buf: critical_section::Mutex<RefCell<heapless::String<DATA_BUF_SIZE>>>,
        ring_buf: critical_section::Mutex<RefCell<Option<StaticRb<u8, RING_BUF_SIZE>>>>,
    }

    unsafe impl Send for Logger {}
    unsafe impl Sync for Logger {}

    static LOGGER_RB: Logger = Logger {
        frame_queue: embassy_sync::channel::Channel::new(),
        data_buf: critical_section::Mutex::new(RefCell::new(heapless::String::new())),
        ring_buf: critical_section::Mutex::new(RefCell::new(None)),
    };

    impl log::Log for Logger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            critical_section::with(|cs| {
                let mut rb_opt = self.ring_buf.borrow_ref_mut(cs);
                let Some(rb) = rb_opt.as_mut() else {
                    return;
                };
                let mut buf = self.data_buf.borrow_ref_mut(cs);
                buf.clear();
                let _ = writeln!(
                    buf,
                    "[{}] {} - {}\r",
                    record.target(),
                    record.level(),
                    record.args()
                );
                if rb.vacant_len() < buf.len() || self.frame_queue.is_full() {
                    return;
                }
                rb.push_slice(buf.as_bytes());
                let _ = self.frame_queue.try_send(buf.len());
            });
        }

        fn flush(&self) {
            while !self.frame_queue().is_empty() {}
        }
    }

    impl Logger {
        pub fn frame_queue(&self) -> &FrameQueue {
            &self.frame_queue
        }
    }

    /// Install the ring buffer logger. Calling this a second time only updates the level.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        if !super::LOGGER_INIT_DONE.swap(true, core::sync::atomic::Ordering::Relaxed) {
            critical_section::with(|cs| {
                LOGGER_RB
                    .ring_buf
                    .borrow_ref_mut(cs)
                    .replace(StaticRb::<u8, RING_BUF_SIZE>::default());
            });
            set_logger(&LOGGER_RB)?;
        }
        set_max_level(level);
        Ok(())
    }

    /// Pop the next frame of the given length into `buf`. Returns the number of bytes copied.
    ///
    /// Bytes of the frame which do not fit into `buf` are discarded.
    pub fn read_next_frame(frame_len: usize, buf: &mut [u8]) -> usize {
        let read_len = core::cmp::min(frame_len, buf.len());
        critical_section::with(|cs| {
            let mut rb_opt = LOGGER_RB.ring_buf.borrow_ref_mut(cs);
            let Some(rb) = rb_opt.as_mut() else {
                return 0;
            };
            let read = rb.pop_slice(&mut buf[0..read_len]);
            rb.skip(frame_len - read_len);
            read
        })
    }

    pub fn get_frame_queue() -> &'static FrameQueue {
        LOGGER_RB.frame_queue()
    }
}
