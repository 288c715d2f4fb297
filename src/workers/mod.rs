pub mod payment_watcher;
