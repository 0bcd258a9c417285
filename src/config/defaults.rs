/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/token-logos.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// Upstream defaults
pub const DEFAULT_ASSET_PLATFORMS_URL: &str = "https://api.coingecko.com/api/v3/asset_platforms";
pub const DEFAULT_TOKEN_LIST_BASE_URL: &str = "https://tokens.coingecko.com";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";

// Indexer defaults
pub const DEFAULT_SCHEDULE: &str = "0 */10 * * * *"; // every 10 minutes
pub const DEFAULT_RUN_ON_STARTUP: bool = true;
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY: &str = "800ms";
pub const DEFAULT_WRITE_CONCURRENCY: usize = 25;
pub const DEFAULT_LOCK_TTL: &str = "5m";

// Logo defaults
pub const DEFAULT_IPFS_GATEWAY: &str = "https://cloudflare-ipfs.com/ipfs/";
pub const DEFAULT_IDENTICON_BASE_URL: &str = "https://avatars.z52da5wt.xyz/";
pub const DEFAULT_NATIVE_LOGO: &str =
    "https://assets.coingecko.com/coins/images/279/standard/ethereum.png";
pub const POLYGON_NATIVE_LOGO: &str =
    "https://assets.coingecko.com/coins/images/32440/standard/polygon.png";
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=604800, immutable";

// Environment overrides
pub const ENV_SUPPORTED_CHAIN_IDS: &str = "TOKEN_LOGO_PROXY_SUPPORTED_CHAIN_IDS";
pub const ENV_DATABASE_URL: &str = "TOKEN_LOGO_PROXY_DATABASE_URL";
