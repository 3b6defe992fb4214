//! Cancellation contexts passed to `start` and to broker hooks.
//!
//! A [`Context`] is a cheap, clonable cancellation token. Child contexts are
//! cancelled together with their parent, never the other way round. Waiting on
//! [`Context::cancelled`] does not poll: waiters are parked on a
//! [`tokio::sync::Notify`] and woken by [`Context::cancel`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A token that signals cancellation across async operations.
///
/// # Examples
///
/// ```rust
/// use ferrous_boot::Context;
///
/// let root = Context::new();
/// let child = root.child();
///
/// root.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
    created_at: Instant,
}

impl Inner {
    fn new(cancelled: bool) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(cancelled),
            notify: Notify::new(),
            children: Mutex::new(Vec::new()),
            created_at: Instant::now(),
        })
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self { inner: Inner::new(false) }
    }

    /// Creates a context cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        let mut children = self.inner.children.lock();
        let inner = Inner::new(self.is_cancelled());
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&inner));
        Self { inner }
    }

    /// Requests cancellation of this context and all of its children.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Completes once cancellation has been requested.
    ///
    /// Intended for `tokio::select!`:
    ///
    /// ```rust
    /// use ferrous_boot::Context;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let ctx = Context::new();
    /// let remote = ctx.clone();
    /// tokio::spawn(async move { remote.cancel() });
    ///
    /// tokio::select! {
    ///     _ = ctx.cancelled() => {}
    ///     _ = tokio::time::sleep(Duration::from_secs(5)) => panic!("not cancelled"),
    /// }
    /// # }
    /// ```
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Creates a child that cancels itself after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let child = self.child();
        let remote = child.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            remote.cancel();
        });
        child
    }

    /// Time since this context was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Context handed to [`AppService`](crate::broker::AppService)s.
///
/// Wraps the run context of a service together with the application's root
/// context, so a service can ask the whole application to shut down.
#[derive(Clone, Debug)]
pub struct AppContext {
    run: Context,
    root: Context,
}

impl AppContext {
    /// Derives an application context from the root context passed to `start`.
    pub fn new(root: Context) -> Self {
        Self { run: root.child(), root }
    }

    /// Context scoped to the running services.
    pub fn context(&self) -> &Context {
        &self.run
    }

    /// Requests application shutdown by cancelling the root context.
    pub fn close(&self) {
        self.root.cancel();
    }

    pub fn is_closing(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_basic() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = Context::new();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(grandchild.is_cancelled());

        let sibling = parent.child();
        parent.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_starts_cancelled() {
        let parent = Context::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn test_app_context_close_cancels_root() {
        let root = Context::new();
        let app = AppContext::new(root.clone());
        assert!(!app.is_closing());

        app.close();
        assert!(root.is_cancelled());
        assert!(app.context().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes() {
        let ctx = Context::new();
        let child = ctx.child();
        let remote = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });
        child.cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_cancels_child() {
        let ctx = Context::new();
        let timed = ctx.with_timeout(Duration::from_millis(10));
        timed.cancelled().await;
        assert!(!ctx.is_cancelled());
    }
}
