//! Studio (authoring system) adapter

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::{http, Result, SyncError};
use crate::core::catalog::{Catalog, Course, CourseRun, Partner};
use crate::core::config::IngestionConfig;
use crate::core::entity::Pacing;
use crate::core::identity::CourseRunKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudioSchedule {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudioTeamMember {
    pub user: String,
    pub role: String,
}

/// Run payload sent to Studio
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudioRun {
    pub title: String,
    pub org: String,
    pub number: String,
    pub run: String,
    pub team: Vec<StudioTeamMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_type: Option<Pacing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<StudioSchedule>,
}

pub trait StudioApi {
    fn create_run(&self, run: &StudioRun) -> Result<()>;
    fn rerun(&self, old_run_key: &str, run: &StudioRun) -> Result<()>;
    fn update_run(&self, key: &str, run: &StudioRun) -> Result<()>;
    fn upload_image(&self, key: &str, content_type: Option<&str>, bytes: &[u8]) -> Result<()>;
}

/// Compose the Studio payload for a run.
///
/// Schedule and pacing go out on create only; updates must not clobber the
/// team and dates edited directly in Studio.
pub fn studio_payload(
    course: &Course,
    run: &CourseRun,
    create: bool,
    user: Option<&str>,
) -> Result<StudioRun> {
    let key: CourseRunKey = run
        .key
        .parse()
        .map_err(|e: crate::core::identity::KeyParseError| SyncError::Decode(e.to_string()))?;
    let course_key = key.course_key();
    let team = match (create, user) {
        (true, Some(user)) => vec![StudioTeamMember {
            user: user.to_string(),
            role: "instructor".to_string(),
        }],
        _ => Vec::new(),
    };
    Ok(StudioRun {
        title: run.title_override.clone().unwrap_or_else(|| course.title.clone()),
        org: course_key.org().to_string(),
        number: course_key.number().to_string(),
        run: key.run().to_string(),
        team,
        pacing_type: if create { run.pacing_type } else { None },
        schedule: if create {
            Some(StudioSchedule {
                start: run.start.clone(),
                end: run.end.clone(),
            })
        } else {
            None
        },
    })
}

/// Create, rerun or update a run in Studio, then push the course image
pub fn push_to_studio(
    studio: &dyn StudioApi,
    catalog: &Catalog,
    course: &Course,
    run: &CourseRun,
    create: bool,
    old_run_key: Option<&str>,
    user: Option<&str>,
) -> Result<()> {
    let payload = studio_payload(course, run, create, user)?;
    match (create, old_run_key) {
        (true, Some(old)) => studio.rerun(old, &payload)?,
        (true, None) => studio.create_run(&payload)?,
        (false, _) => studio.update_run(&run.key, &payload)?,
    }
    if let Some(hash) = &course.image_hash {
        if let Some((content_type, bytes)) = catalog.image_data(hash)? {
            studio.upload_image(&run.key, content_type.as_deref(), &bytes)?;
        }
    }
    info!(run = %run.key, create, "pushed to studio");
    Ok(())
}

/// Studio REST client scoped to a partner
pub struct StudioClient {
    client: Client,
    base_url: String,
}

impl StudioClient {
    pub fn new(partner: &Partner, config: &IngestionConfig) -> Result<Self> {
        let base_url = config
            .studio
            .base_url
            .clone()
            .or_else(|| partner.studio_url.clone())
            .ok_or(SyncError::NotConfigured("studio.base_url"))?;
        Ok(Self {
            client: http::build_client(
                config.http_timeout_secs,
                &http::api_user_agent(),
                config.studio.token.as_deref(),
            )?,
            base_url,
        })
    }
}

impl StudioApi for StudioClient {
    fn create_run(&self, run: &StudioRun) -> Result<()> {
        let url = http::join(&self.base_url, "/course_runs/")?;
        http::check(self.client.post(url).json(run).send()?)?;
        Ok(())
    }

    fn rerun(&self, old_run_key: &str, run: &StudioRun) -> Result<()> {
        let url = http::join(&self.base_url, &format!("/course_runs/{}/rerun/", old_run_key))?;
        http::check(self.client.post(url).json(run).send()?)?;
        Ok(())
    }

    fn update_run(&self, key: &str, run: &StudioRun) -> Result<()> {
        let url = http::join(&self.base_url, &format!("/course_runs/{}/", key))?;
        http::check(self.client.patch(url).json(run).send()?)?;
        Ok(())
    }

    fn upload_image(&self, key: &str, content_type: Option<&str>, bytes: &[u8]) -> Result<()> {
        let url = http::join(&self.base_url, &format!("/course_runs/{}/images/", key))?;
        let mut part = Part::bytes(bytes.to_vec()).file_name("card_image");
        if let Some(ct) = content_type {
            part = part
                .mime_str(ct)
                .map_err(|e| SyncError::Transport(e.to_string()))?;
        }
        let form = Form::new().part("card_image", part);
        http::check(self.client.post(url).multipart(form).send()?)?;
        debug!(run = key, len = bytes.len(), "image uploaded to studio");
        Ok(())
    }
}

/// Records Studio calls in the catalog outbox instead of sending them
pub struct NoopStudio<'a> {
    catalog: &'a Catalog,
}

impl<'a> NoopStudio<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    fn record(&self, action: &str, target: &str, run: &StudioRun) -> Result<()> {
        let payload = serde_json::to_value(run).map_err(|e| SyncError::Decode(e.to_string()))?;
        self.catalog.record_outbox("studio", action, target, &payload)?;
        Ok(())
    }
}

impl StudioApi for NoopStudio<'_> {
    fn create_run(&self, run: &StudioRun) -> Result<()> {
        self.record("create", &run.run, run)
    }

    fn rerun(&self, old_run_key: &str, run: &StudioRun) -> Result<()> {
        self.record("rerun", old_run_key, run)
    }

    fn update_run(&self, key: &str, run: &StudioRun) -> Result<()> {
        self.record("update", key, run)
    }

    fn upload_image(&self, key: &str, content_type: Option<&str>, bytes: &[u8]) -> Result<()> {
        self.catalog.record_outbox(
            "studio",
            "image",
            key,
            &json!({ "content_type": content_type, "len": bytes.len() }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fixtures::{course, run};

    #[test]
    fn test_payload_schedule_on_create_only() {
        let created = studio_payload(&course(), &run(), true, Some("alice")).unwrap();
        assert_eq!(created.org, "edx");
        assert_eq!(created.number, "BIO101");
        assert_eq!(created.run, "1T2025");
        assert!(created.schedule.is_some());
        assert_eq!(created.team.len(), 1);

        let updated = studio_payload(&course(), &run(), false, Some("alice")).unwrap();
        assert!(updated.schedule.is_none());
        assert!(updated.pacing_type.is_none());
        assert!(updated.team.is_empty());
    }

    #[test]
    fn test_rerun_posts_to_old_key() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/course_runs/course-v1:edx+BIO101+1T2024/rerun/")
            .with_status(201)
            .create();

        let mut config = IngestionConfig::default();
        config.studio.base_url = Some(server.url());
        let partner = Partner {
            id: 1,
            short_code: "edx".to_string(),
            name: "edX".to_string(),
            marketing_site_url_root: None,
            marketing_site_api_username: None,
            marketing_site_api_password: None,
            studio_url: None,
            lms_url: None,
        };
        let client = StudioClient::new(&partner, &config).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();

        push_to_studio(
            &client,
            &catalog,
            &course(),
            &run(),
            true,
            Some("course-v1:edx+BIO101+1T2024"),
            None,
        )
        .unwrap();
        mock.assert();
    }

    #[test]
    fn test_noop_records_outbox() {
        let catalog = Catalog::open_in_memory().unwrap();
        let studio = NoopStudio::new(&catalog);
        push_to_studio(&studio, &catalog, &course(), &run(), false, None, None).unwrap();

        let entries = catalog.outbox_entries("studio").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "update");
        assert_eq!(entries[0].1, "course-v1:edx+BIO101+1T2025");
    }
}
