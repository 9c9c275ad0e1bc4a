//! External sync broker
//!
//! Thin adapters for the systems an ingestion run talks to. Every adapter
//! sits behind a trait so loaders can run against local stand-ins, and every
//! call fails independently: a failed downstream call is logged and reported
//! but never rolls back catalog writes on its own.

pub mod course_api;
pub mod http;
pub mod images;
pub mod marketing;
pub mod notify;
pub mod salesforce;
pub mod search;
pub mod sheets;
pub mod studio;

use thiserror::Error;

use crate::core::catalog::{Catalog, CatalogError, Partner};
use crate::core::config::{CourseApiMode, IngestionConfig};

pub use course_api::{CourseApi, HttpCourseApi, LocalCourseApi};
pub use images::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use marketing::{MarketingSite, MarketingSitePublisher, NoopMarketingSite};
pub use notify::{Notification, Notifier, OutboxNotifier};
pub use salesforce::{NoopSalesforce, Salesforce, SalesforceClient};
pub use search::{IndexSignals, IndexSuppression};
pub use sheets::{GoogleSheetsClient, SheetsClient};
pub use studio::{NoopStudio, StudioApi, StudioClient};

/// Errors raised by external adapters
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("missing Salesforce case for {0}")]
    MissingCase(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SyncError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => SyncError::Transport(err.to_string()),
        }
    }
}

impl SyncError {
    /// A request rejected by the receiving side
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        SyncError::Http {
            status,
            body: body.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// The collaborators an ingestion run dispatches to
pub struct Services<'a> {
    pub course_api: Box<dyn CourseApi + 'a>,
    pub images: Box<dyn ImageFetcher + 'a>,
    pub studio: Box<dyn StudioApi + 'a>,
    pub marketing: Box<dyn MarketingSite + 'a>,
    pub salesforce: Box<dyn Salesforce + 'a>,
    pub notifier: Box<dyn Notifier + 'a>,
    pub sheets: Box<dyn SheetsClient + 'a>,
}

impl<'a> Services<'a> {
    /// Build the configured adapters for a partner
    pub fn from_config(
        catalog: &'a Catalog,
        partner: &Partner,
        config: &IngestionConfig,
    ) -> Result<Self> {
        let course_api: Box<dyn CourseApi + 'a> = match config.course_api.mode {
            CourseApiMode::Local => Box::new(LocalCourseApi::new(catalog, partner.clone())),
            CourseApiMode::Http => Box::new(HttpCourseApi::new(config)?),
        };

        let studio: Box<dyn StudioApi + 'a> = if config.studio.enabled {
            Box::new(StudioClient::new(partner, config)?)
        } else {
            Box::new(NoopStudio::new(catalog))
        };

        let marketing: Box<dyn MarketingSite + 'a> = if config.marketing.enabled {
            Box::new(MarketingSitePublisher::new(partner, config)?)
        } else {
            Box::new(NoopMarketingSite::new(catalog))
        };

        let salesforce: Box<dyn Salesforce + 'a> = if config.salesforce.enabled {
            Box::new(SalesforceClient::new(config)?)
        } else {
            Box::new(NoopSalesforce)
        };

        catalog.signals().set_enabled(config.search_index.enabled);

        Ok(Self {
            course_api,
            images: Box::new(HttpImageFetcher::new(config)?),
            studio,
            marketing,
            salesforce,
            notifier: Box::new(OutboxNotifier::new(config)),
            sheets: Box::new(GoogleSheetsClient::new(config)?),
        })
    }
}
