pub mod config;
pub mod error;
pub mod spend;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{MixError, MixResult};
pub use store::{FactBundle, FactSource, InMemoryStore, ResultStore};
pub use types::{
    AdClick, AttributionEvent, CampaignSpend, Channel, DailyChannelSpend, MmmCoefficient, Order,
    RunMetadata,
};
