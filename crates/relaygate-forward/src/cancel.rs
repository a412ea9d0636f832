use tokio::sync::watch;

/// Bound to a single client connection. The forwarder polls
/// `is_cancelled()` before each upstream read per spec.md §4.B/§5.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

pub struct CancelHandle(watch::Sender<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}
