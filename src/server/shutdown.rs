use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::oneshot;

/// Creates a linked handle/signal pair. The replication listener runs until
/// the signal resolves, which happens when the last handle is dropped or an
/// explicit shutdown fires it.
pub fn shutdown_signal() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (ShutdownHandle { _tx: tx }, ShutdownSignal { rx })
}

pub struct ShutdownHandle {
    _tx: oneshot::Sender<()>,
}

pub struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Sent value and dropped sender both mean "stop".
        let _ = ready!(Pin::new(&mut self.rx).poll(cx));
        Poll::Ready(())
    }
}
