//! Navigation epochs. Every page entry takes a ticket; starting a newer navigation makes
//! older tickets stale so their in-flight work can be dropped instead of applied.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Navigation {
    epoch: Arc<watch::Sender<u64>>,
}

impl Default for Navigation {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(0u64);
        Self { epoch: Arc::new(tx) }
    }
}

impl Navigation {
    pub fn new() -> Self { Self::default() }

    /// Start a navigation; any earlier ticket becomes stale.
    pub fn begin(&self) -> Ticket {
        let mut epoch = 0;
        self.epoch.send_modify(|e| {
            *e += 1;
            epoch = *e;
        });
        Ticket { epoch, rx: self.epoch.subscribe() }
    }

    /// The user left the current view without entering another protected page.
    pub fn leave(&self) {
        self.epoch.send_modify(|e| *e += 1);
    }

    pub fn current(&self) -> u64 { *self.epoch.borrow() }
}

pub struct Ticket {
    epoch: u64,
    rx: watch::Receiver<u64>,
}

impl Ticket {
    pub fn epoch(&self) -> u64 { self.epoch }

    pub fn is_current(&self) -> bool { *self.rx.borrow() == self.epoch }

    /// Resolves once a newer navigation has started.
    pub async fn superseded(&mut self) {
        let epoch = self.epoch;
        let moved_on = self.rx.wait_for(|e| *e != epoch).await.is_ok();
        if !moved_on {
            // sender gone: nothing can supersede us any more
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn newer_navigation_stales_older_ticket() {
        let nav = Navigation::new();
        let first = nav.begin();
        assert!(first.is_current());
        let second = nav.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        nav.leave();
        assert!(!second.is_current());
        assert_eq!(nav.current(), 3);
    }

    #[tokio::test]
    async fn superseded_wakes_on_leave() {
        let nav = Navigation::new();
        let mut t = nav.begin();
        let nav2 = nav.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            nav2.leave();
        });
        tokio::time::timeout(Duration::from_secs(1), t.superseded()).await.expect("woken");
    }
}
