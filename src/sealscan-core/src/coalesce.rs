//! Scan input coalescing.
//!
//! Physical barcode and QR readers differ in delivery: some emit the whole
//! decoded string atomically, others type it character by character at
//! USB-HID speed. The coalescer buffers partial input for one slot and emits
//! exactly one stable event per burst, on whichever comes first:
//!
//! 1. the debounce window elapses with no further input,
//! 2. the early-completion predicate accepts the accumulated buffer,
//! 3. the source signals completion (newline/enter).
//!
//! Re-arming always aborts the pending timer task, so a stale emission can
//! never fire after newer input arrived. No emission occurs while the shared
//! session lock flag is set, and callers must [`cancel`](ScanCoalescer::cancel)
//! before resetting the session so an in-flight timer cannot land in the
//! fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Input slot a scan arrives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanSlot {
    /// Module IMEI barcode reader.
    ModuleBarcode,
    /// Enclosure QR reader.
    EnclosureQr,
}

/// A stabilized scan emitted by a [`ScanCoalescer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Slot the scan arrived on.
    pub slot: ScanSlot,
    /// Full accumulated text of the burst.
    pub text: String,
}

/// Early-completion predicate: emit as soon as the buffer satisfies it.
pub type CompletionPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Debouncing accumulator for one scan input slot.
///
/// Timers are per-slot and never shared across sessions.
pub struct ScanCoalescer {
    slot: ScanSlot,
    window: Duration,
    early_complete: Option<CompletionPredicate>,
    locked: Arc<AtomicBool>,
    buffer: Arc<Mutex<String>>,
    pending: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ScanCoalescer {
    /// Create a coalescer emitting stable scans on `tx`.
    ///
    /// `locked` is the session lock flag shared with the engine
    /// ([`VerificationEngine::lock_flag`]); while it is set, input is ignored
    /// and armed timers are suppressed at fire time.
    ///
    /// [`VerificationEngine::lock_flag`]: crate::engine::VerificationEngine::lock_flag
    #[must_use]
    pub fn new(
        slot: ScanSlot,
        window: Duration,
        locked: Arc<AtomicBool>,
        tx: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        Self {
            slot,
            window,
            early_complete: None,
            locked,
            buffer: Arc::new(Mutex::new(String::new())),
            pending: None,
            tx,
        }
    }

    /// Install an early-completion predicate.
    #[must_use]
    pub fn with_early_complete(mut self, predicate: CompletionPredicate) -> Self {
        self.early_complete = Some(predicate);
        self
    }

    /// Standard predicate for URL-bearing QR payloads: scheme prefix present
    /// and at least `min_len` characters accumulated.
    #[must_use]
    pub fn url_predicate(min_len: usize) -> CompletionPredicate {
        Arc::new(move |text: &str| text.starts_with("https://") && text.len() >= min_len)
    }

    /// Feed partial input from the reader.
    ///
    /// Appends to the slot buffer and re-arms the debounce timer; emits
    /// immediately when the early-completion predicate accepts the buffer.
    pub fn on_partial_input(&mut self, text: &str) {
        if self.locked.load(Ordering::SeqCst) {
            trace!(slot = ?self.slot, "partial input ignored: session locked");
            return;
        }
        self.cancel_pending();

        let emit_now = {
            let Ok(mut buffer) = self.buffer.lock() else {
                return;
            };
            buffer.push_str(text);
            trace!(slot = ?self.slot, len = buffer.len(), "partial input buffered");
            self.early_complete
                .as_ref()
                .is_some_and(|predicate| predicate(&buffer))
        };

        if emit_now {
            debug!(slot = ?self.slot, "early completion predicate satisfied");
            self.emit_buffer();
        } else {
            self.arm();
        }
    }

    /// Completion signal from the source (newline/enter): emit immediately.
    pub fn on_complete_signal(&mut self) {
        self.cancel_pending();
        if self.locked.load(Ordering::SeqCst) {
            trace!(slot = ?self.slot, "completion signal ignored: session locked");
            if let Ok(mut buffer) = self.buffer.lock() {
                buffer.clear();
            }
            return;
        }
        self.emit_buffer();
    }

    /// Abort any pending emission and drop buffered input.
    ///
    /// Must be called before the session is reset.
    pub fn cancel(&mut self) {
        self.cancel_pending();
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }

    fn arm(&mut self) {
        let slot = self.slot;
        let window = self.window;
        let locked = Arc::clone(&self.locked);
        let buffer = Arc::clone(&self.buffer);
        let tx = self.tx.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if locked.load(Ordering::SeqCst) {
                debug!(slot = ?slot, "stable scan suppressed: session locked");
                if let Ok(mut buf) = buffer.lock() {
                    buf.clear();
                }
                return;
            }
            let text = match buffer.lock() {
                Ok(mut buf) => std::mem::take(&mut *buf),
                Err(_) => return,
            };
            if text.is_empty() {
                return;
            }
            debug!(slot = ?slot, len = text.len(), "input stabilized after debounce");
            let _ = tx.send(ScanEvent { slot, text });
        }));
    }

    fn emit_buffer(&mut self) {
        let text = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => return,
        };
        if text.is_empty() {
            return;
        }
        debug!(slot = ?self.slot, len = text.len(), "stable scan emitted");
        let _ = self.tx.send(ScanEvent {
            slot: self.slot,
            text,
        });
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(120);

    fn make_coalescer(
        slot: ScanSlot,
        locked: &Arc<AtomicBool>,
    ) -> (ScanCoalescer, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ScanCoalescer::new(slot, WINDOW, Arc::clone(locked), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_partials_emit_once_with_final_text() {
        let locked = Arc::new(AtomicBool::new(false));
        let (mut coalescer, mut rx) = make_coalescer(ScanSlot::ModuleBarcode, &locked);

        for chunk in ["8694", "87066", "634", "998"] {
            coalescer.on_partial_input(chunk);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let event = rx.recv().await.expect("one stable emission");
        assert_eq!(event.slot, ScanSlot::ModuleBarcode);
        assert_eq!(event.text, "869487066634998");
        assert!(rx.try_recv().is_err(), "no intermediate emissions");
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_completion_emits_without_waiting() {
        let locked = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coalescer =
            ScanCoalescer::new(ScanSlot::EnclosureQr, WINDOW, Arc::clone(&locked), tx)
                .with_early_complete(ScanCoalescer::url_predicate(54));

        coalescer.on_partial_input("https://tydendigital.com/#/scan-device/869487066634998");

        // No time has passed; the predicate emitted synchronously.
        let event = rx.try_recv().expect("immediate emission");
        assert_eq!(
            event.text,
            "https://tydendigital.com/#/scan-device/869487066634998"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_signal_emits_immediately() {
        let locked = Arc::new(AtomicBool::new(false));
        let (mut coalescer, mut rx) = make_coalescer(ScanSlot::ModuleBarcode, &locked);

        coalescer.on_partial_input("869487066634998");
        coalescer.on_complete_signal();

        let event = rx.try_recv().expect("emission on completion signal");
        assert_eq!(event.text, "869487066634998");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_emission_while_locked() {
        let locked = Arc::new(AtomicBool::new(false));
        let (mut coalescer, mut rx) = make_coalescer(ScanSlot::EnclosureQr, &locked);

        // Lock lands after input was buffered but before the timer fires.
        coalescer.on_partial_input("https://tydendigital.com/#/scan-device/");
        locked.store(true, Ordering::SeqCst);
        tokio::time::sleep(WINDOW * 3).await;
        assert!(rx.try_recv().is_err());

        // Input while locked is ignored outright.
        coalescer.on_partial_input("more");
        coalescer.on_complete_signal();
        tokio::time::sleep(WINDOW * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_emission() {
        let locked = Arc::new(AtomicBool::new(false));
        let (mut coalescer, mut rx) = make_coalescer(ScanSlot::ModuleBarcode, &locked);

        coalescer.on_partial_input("869487066634998");
        coalescer.cancel();
        tokio::time::sleep(WINDOW * 3).await;

        assert!(rx.try_recv().is_err(), "cancelled burst must not emit");

        // The buffer was dropped with it: a later burst starts fresh.
        coalescer.on_partial_input("111111111111111");
        coalescer.on_complete_signal();
        assert_eq!(rx.try_recv().unwrap().text, "111111111111111");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_signal_with_empty_buffer_is_silent() {
        let locked = Arc::new(AtomicBool::new(false));
        let (mut coalescer, mut rx) = make_coalescer(ScanSlot::ModuleBarcode, &locked);

        coalescer.on_complete_signal();
        assert!(rx.try_recv().is_err());
    }
}
