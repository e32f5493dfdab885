pub mod catalog;
pub mod chat;
pub mod config_store;
pub mod content_type;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod outcomes;
pub mod prompts;
pub mod server;
pub mod service;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod templates;
pub mod utils;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块与类型。
 */
pub mod prelude {
    pub use crate::catalog::ProviderCatalog;
    pub use crate::content_type::ContentType;
    pub use crate::error::GenerationError;
    pub use crate::models;
    pub use crate::server;
    pub use crate::service::GenerationService;
    pub use crate::settings::Settings;
    pub use crate::store::SqliteStore;
    pub use crate::telemetry;
}
