//! Single-slot hand-off between one worker and one consumer.
//!
//! The consumer polls on a fixed timer and renders only the newest value it
//! finds, so the mailbox holds at most one frame. A worker that publishes
//! into a full slot loses the new frame rather than blocking or overwriting
//! the unread one. Neither side ever waits on the other.

use std::sync::Mutex;

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox closed")]
    Closed,
}

#[derive(Debug)]
enum Slot {
    Empty,
    Full(Frame),
    Closed,
}

/// Put-if-empty, take-destructively, single-frame mailbox.
///
/// Share it as `Arc<Mailbox>`. The lock is held only for the check-and-set
/// itself.
#[derive(Debug)]
pub struct Mailbox {
    slot: Mutex<Slot>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Store `frame` if the slot is empty.
    ///
    /// Returns `Ok(false)` and drops `frame` if a previous frame is still
    /// unread.
    pub fn publish(&self, frame: Frame) -> Result<bool, MailboxError> {
        let mut slot = self.lock();
        match *slot {
            Slot::Empty => {
                *slot = Slot::Full(frame);
                Ok(true)
            }
            Slot::Full(_) => Ok(false),
            Slot::Closed => Err(MailboxError::Closed),
        }
    }

    /// Remove and return the buffered frame, if any.
    pub fn try_take(&self) -> Result<Option<Frame>, MailboxError> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Empty => Ok(None),
            Slot::Full(frame) => Ok(Some(frame)),
            Slot::Closed => {
                *slot = Slot::Closed;
                Err(MailboxError::Closed)
            }
        }
    }

    /// Discard any buffered frame without closing.
    pub fn drain(&self) {
        let mut slot = self.lock();
        if let Slot::Full(_) = *slot {
            *slot = Slot::Empty;
        }
    }

    /// Mark the mailbox unusable. Any buffered frame is discarded.
    pub fn close(&self) {
        *self.lock() = Slot::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), Slot::Closed)
    }

    pub fn is_empty(&self) -> bool {
        matches!(*self.lock(), Slot::Empty)
    }

    // A panic while holding the lock cannot leave the slot half-written,
    // so recover from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{SkinMatrix, TemperatureReading};
    use std::sync::Arc;

    fn temp(v: f64) -> Frame {
        Frame::Temperature(TemperatureReading::new(v, v, v))
    }

    #[test]
    fn test_publish_then_take() {
        let mailbox = Mailbox::new();
        assert!(mailbox.publish(temp(1.0)).unwrap());
        assert!(!mailbox.is_empty());
        assert_eq!(mailbox.try_take().unwrap(), Some(temp(1.0)));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_second_publish_is_dropped() {
        let mailbox = Mailbox::new();
        assert!(mailbox.publish(temp(1.0)).unwrap());
        assert!(!mailbox.publish(temp(2.0)).unwrap());

        // First frame retained, second discarded
        assert_eq!(mailbox.try_take().unwrap(), Some(temp(1.0)));
        assert_eq!(mailbox.try_take().unwrap(), None);
    }

    #[test]
    fn test_take_on_empty_returns_none() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.try_take().unwrap(), None);
        assert_eq!(mailbox.try_take().unwrap(), None);
    }

    #[test]
    fn test_slot_reusable_after_take() {
        let mailbox = Mailbox::new();
        mailbox.publish(temp(1.0)).unwrap();
        mailbox.try_take().unwrap();
        assert!(mailbox.publish(temp(2.0)).unwrap());
        assert_eq!(mailbox.try_take().unwrap(), Some(temp(2.0)));
    }

    #[test]
    fn test_closed_mailbox_fails_fast() {
        let mailbox = Mailbox::new();
        mailbox.publish(temp(1.0)).unwrap();
        mailbox.close();

        assert!(mailbox.is_closed());
        assert_eq!(mailbox.publish(temp(2.0)), Err(MailboxError::Closed));
        assert_eq!(mailbox.try_take(), Err(MailboxError::Closed));
        // Still closed after a failed take
        assert_eq!(mailbox.try_take(), Err(MailboxError::Closed));
    }

    #[test]
    fn test_drain_keeps_mailbox_open() {
        let mailbox = Mailbox::new();
        mailbox.publish(Frame::Pressure(SkinMatrix::zeros())).unwrap();
        mailbox.drain();
        assert!(mailbox.is_empty());
        assert!(!mailbox.is_closed());

        mailbox.close();
        mailbox.drain();
        assert!(mailbox.is_closed());
    }

    #[test]
    fn test_concurrent_producer_never_overwrites() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || {
                let mut accepted = 0u32;
                for i in 0..1000 {
                    if mailbox.publish(temp(i as f64)).unwrap() {
                        accepted += 1;
                    }
                }
                accepted
            })
        };

        let mut last = -1.0;
        let mut taken = 0u32;
        while !producer.is_finished() || !mailbox.is_empty() {
            if let Some(Frame::Temperature(t)) = mailbox.try_take().unwrap() {
                // Freshness order is preserved from the producer's side
                assert!(t.contact() > last);
                last = t.contact();
                taken += 1;
            }
        }
        let accepted = producer.join().unwrap();
        assert_eq!(accepted, taken);
    }
}
