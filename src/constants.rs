pub const BIND_PORT: u16 = 5_000;
pub const POLL_INTERVAL_MS: u64 = 5_000;
pub const CACHE_TTL_MS: u64 = 60_000;
pub const UPSTREAM_TIMEOUT_MS: u64 = 10_000;
pub const METRICS_REPORT_SECS: u64 = 30;
pub const BROADCAST_CAPACITY: usize = 1_024;
pub const CORS_ORIGIN: &str = "http://localhost:5173";
pub const FMP_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
pub const ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const SERVICE_NAME: &str = "rust-stock-feed";
