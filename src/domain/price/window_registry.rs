//! Per-source rolling window registry

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::rolling_window::RollingWindow;

/// Shared handle to one source's window
pub type SharedWindow = Arc<Mutex<RollingWindow>>;

/// Maps a source identifier to its window
///
/// The map lock is only held to look up or insert a handle; the window
/// itself has its own lock so different sources update in parallel.
#[derive(Debug)]
pub struct WindowRegistry {
    windows: RwLock<HashMap<String, SharedWindow>>,
    window_size: usize,
}

impl WindowRegistry {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window_size: window_size.max(1),
        }
    }

    /// Existing window for `source`, or a fresh one inserted atomically
    pub async fn get_or_create(&self, source: &str) -> SharedWindow {
        if let Some(window) = self.windows.read().await.get(source) {
            return Arc::clone(window);
        }

        // Another task may have inserted between the two locks; entry() keeps the first.
        let mut windows = self.windows.write().await;
        let window = windows
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RollingWindow::new(self.window_size))));
        Arc::clone(window)
    }

    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.windows.read().await.is_empty()
    }

    pub async fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.windows.read().await.keys().cloned().collect();
        sources.sort();
        sources
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new(super::rolling_window::DEFAULT_WINDOW_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_window() {
        let registry = WindowRegistry::new(10);
        let a = registry.get_or_create("binance").await;
        let b = registry.get_or_create("binance").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.lock().await.capacity(), 10);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_sources_are_isolated() {
        let registry = WindowRegistry::default();
        registry.get_or_create("binance").await.lock().await.add_price(1.0);
        registry.get_or_create("kraken").await.lock().await.add_price(2.0);

        assert_eq!(registry.get_or_create("binance").await.lock().await.prices(), vec![1.0]);
        assert_eq!(registry.get_or_create("kraken").await.lock().await.prices(), vec![2.0]);
        assert_eq!(registry.sources().await, vec!["binance", "kraken"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_single_window() {
        let registry = Arc::new(WindowRegistry::new(1_000));
        let mut handles = Vec::new();

        for task in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let window = registry.get_or_create("coingecko").await;
                    window.lock().await.add_price((task * 100 + i) as f64);
                }
                registry.get_or_create("coingecko").await
            }));
        }

        let mut windows = Vec::new();
        for handle in handles {
            windows.push(handle.await.unwrap());
        }

        assert_eq!(registry.len().await, 1);
        assert!(windows.iter().all(|w| Arc::ptr_eq(w, &windows[0])));
        assert_eq!(windows[0].lock().await.len(), 16 * 25);
    }
}
