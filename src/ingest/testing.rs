//! Shared fixtures for loader tests

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

use crate::core::catalog::{Catalog, SeedData};
use crate::core::config::IngestionConfig;
use crate::ingest::IngestionContext;
use crate::sync::course_api::{CourseCreate, CourseCreated, RunCreateFields};
use crate::sync::{
    FetchedImage, ImageFetcher, LocalCourseApi, NoopMarketingSite, NoopSalesforce, NoopStudio,
    Notification, Notifier, Services, SheetsClient, SyncError,
};

pub const SEED: &str = r#"
partners:
  - short_code: edx
    name: edX
sources:
  - { slug: edx, name: edX }
  - { slug: ext_source, name: External Source }
organizations:
  - partner: edx
    key: edx
    name: edX
  - partner: edx
    key: other
    name: Other University
    mappings:
      - { source: ext_source, key: other-ext }
users:
  - username: alice
    email: alice@example.com
    partner: edx
    organizations: [other]
  - username: bob
    email: bob@example.com
    partner: edx
    organizations: [edx]
seat_types:
  - { slug: audit, name: Audit }
  - { slug: verified, name: Verified }
course_run_types:
  - slug: verified-audit
    name: Verified and Audit
    uuid: 00000000-0000-0000-0000-0000000000r1
    seat_types: [audit, verified]
  - slug: audit
    name: Audit Only
    uuid: 00000000-0000-0000-0000-0000000000r2
    seat_types: [audit]
course_types:
  - slug: verified-audit
    name: Verified and Audit
    uuid: 00000000-0000-0000-0000-0000000000c1
    entitlement_types: [verified]
    run_types: [verified-audit]
  - slug: audit
    name: Audit Only
    uuid: 00000000-0000-0000-0000-0000000000c2
    run_types: [audit]
  - slug: executive-education-2u
    name: Executive Education
    uuid: 00000000-0000-0000-0000-0000000000c3
    entitlement_types: [verified]
    run_types: [verified-audit]
subjects:
  - { partner: edx, slug: biology, name: Biology, name_es: Biología }
  - { partner: edx, slug: computer-science, name: Computer Science }
level_types: [Introductory, Advanced]
language_tags:
  - { code: en-us, name: English - United States }
  - { code: es, name: Spanish }
program_types:
  - { slug: masters, name: Masters }
collaborators: [Acme Labs]
"#;

pub fn seeded_catalog() -> Catalog {
    let catalog = Catalog::open_in_memory().unwrap();
    catalog
        .apply_seed(&SeedData::from_yaml(SEED).unwrap())
        .unwrap();
    catalog
}

/// Notifier that keeps sent messages in memory
#[derive(Clone, Default)]
pub struct StubNotifier(Rc<RefCell<Vec<Notification>>>);

impl StubNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.0.borrow().clone()
    }
}

impl Notifier for StubNotifier {
    fn send(&self, notification: &Notification) -> crate::sync::Result<()> {
        self.0.borrow_mut().push(notification.clone());
        Ok(())
    }
}

/// Serves a tiny PNG for every URL except those containing `404`
pub struct StubImages;

impl ImageFetcher for StubImages {
    fn fetch(&self, url: &str) -> crate::sync::Result<FetchedImage> {
        if url.contains("404") {
            return Err(SyncError::rejected(404, format!("{} not found", url)));
        }
        Ok(FetchedImage {
            bytes: b"\x89PNG\r\n\x1a\nstub".to_vec(),
            content_type: Some("image/png".to_string()),
        })
    }
}

pub struct NoSheets;

impl SheetsClient for NoSheets {
    fn read_tab(&self, _sheet_id: &str, _tab_id: &str) -> crate::sync::Result<Vec<Vec<String>>> {
        Err(SyncError::NotConfigured("sheets"))
    }
}

pub fn default_config() -> &'static IngestionConfig {
    static CONFIG: OnceLock<IngestionConfig> = OnceLock::new();
    CONFIG.get_or_init(IngestionConfig::default)
}

pub fn context<'a>(catalog: &'a Catalog, notifier: &StubNotifier) -> IngestionContext<'a> {
    context_with(catalog, notifier, default_config())
}

pub fn context_with<'a>(
    catalog: &'a Catalog,
    notifier: &StubNotifier,
    config: &'a IngestionConfig,
) -> IngestionContext<'a> {
    let partner = catalog.partner_by_code("edx").unwrap().unwrap();
    let services = Services {
        course_api: Box::new(LocalCourseApi::new(catalog, partner.clone())),
        images: Box::new(StubImages),
        studio: Box::new(NoopStudio::new(catalog)),
        marketing: Box::new(NoopMarketingSite::new(catalog)),
        salesforce: Box::new(NoopSalesforce),
        notifier: Box::new(notifier.clone()),
        sheets: Box::new(NoSheets),
    };
    IngestionContext::new(catalog, partner, config, services)
}

/// Draft course `edx+{number}` with one verified-audit run
pub fn create_course(ctx: &IngestionContext<'_>, number: &str) -> CourseCreated {
    ctx.services
        .course_api
        .create_course(&CourseCreate {
            org: "edx".to_string(),
            title: format!("Course {}", number),
            number: number.to_string(),
            course_type: "00000000-0000-0000-0000-0000000000c1".to_string(),
            product_source: "edx".to_string(),
            prices: [("verified".to_string(), "100.00".to_string())].into(),
            course_run: RunCreateFields {
                start: Some("2025-01-01T09:00:00Z".to_string()),
                end: Some("2025-03-01T17:00:00Z".to_string()),
                run_type: "00000000-0000-0000-0000-0000000000r1".to_string(),
                ..Default::default()
            },
        })
        .unwrap()
}
