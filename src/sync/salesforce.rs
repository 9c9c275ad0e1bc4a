//! Salesforce adapter

use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;

use super::{http, Result, SyncError};
use crate::core::catalog::{Course, CourseRun};
use crate::core::config::IngestionConfig;

pub trait Salesforce {
    /// Upsert a published run. A course without a review case surfaces as
    /// `SyncError::MissingCase`; callers treat that as success.
    fn upsert_course_run(&self, course: &Course, run: &CourseRun) -> Result<()>;
}

/// REST client against a Salesforce `services/data/vXX.X` base URL
pub struct SalesforceClient {
    client: Client,
    base_url: String,
}

impl SalesforceClient {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        let base_url = config
            .salesforce
            .base_url
            .clone()
            .ok_or(SyncError::NotConfigured("salesforce.base_url"))?;
        Ok(Self {
            client: http::build_client(
                config.http_timeout_secs,
                &http::api_user_agent(),
                config.salesforce.token.as_deref(),
            )?,
            base_url,
        })
    }
}

impl Salesforce for SalesforceClient {
    fn upsert_course_run(&self, course: &Course, run: &CourseRun) -> Result<()> {
        let url = http::join(
            &self.base_url,
            &format!("/sobjects/Course_Run__c/Course_Run_Key__c/{}", run.key),
        )?;
        let body = json!({
            "Course__r": { "Course_Key__c": course.key },
            "Start_Date__c": run.start,
            "End_Date__c": run.end,
            "Pacing__c": run.pacing_type.map(|p| p.as_str()),
            "Status__c": run.status.as_str(),
        });
        http::check(self.client.patch(url).json(&body).send()?)?;

        let case_url = http::join(
            &self.base_url,
            &format!("/sobjects/Case/Course_Key__c/{}", course.key),
        )?;
        match http::check(self.client.get(case_url).send()?) {
            Ok(_) => {}
            Err(SyncError::Http { status: 404, .. }) => {
                return Err(SyncError::MissingCase(course.key.clone()))
            }
            Err(e) => return Err(e),
        }
        debug!(run = %run.key, "salesforce course run upserted");
        Ok(())
    }
}

/// Used when Salesforce is not configured
pub struct NoopSalesforce;

impl Salesforce for NoopSalesforce {
    fn upsert_course_run(&self, _course: &Course, _run: &CourseRun) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fixtures::{course, run};

    fn client(url: String) -> SalesforceClient {
        let mut config = IngestionConfig::default();
        config.salesforce.base_url = Some(url);
        config.salesforce.token = Some("sf".to_string());
        SalesforceClient::new(&config).unwrap()
    }

    #[test]
    fn test_missing_case_is_reported() {
        let mut server = mockito::Server::new();
        let upsert = server
            .mock(
                "PATCH",
                "/sobjects/Course_Run__c/Course_Run_Key__c/course-v1:edx+BIO101+1T2025",
            )
            .match_header("authorization", "Bearer sf")
            .with_status(204)
            .create();
        let _case = server
            .mock("GET", "/sobjects/Case/Course_Key__c/edx+BIO101")
            .with_status(404)
            .create();

        let err = client(server.url())
            .upsert_course_run(&course(), &run())
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingCase(ref key) if key == "edx+BIO101"));
        upsert.assert();
    }

    #[test]
    fn test_upsert_with_case_succeeds() {
        let mut server = mockito::Server::new();
        let _upsert = server
            .mock(
                "PATCH",
                "/sobjects/Course_Run__c/Course_Run_Key__c/course-v1:edx+BIO101+1T2025",
            )
            .with_status(204)
            .create();
        let _case = server
            .mock("GET", "/sobjects/Case/Course_Key__c/edx+BIO101")
            .with_status(200)
            .with_body(r#"{"Id":"500"}"#)
            .create();

        assert!(client(server.url()).upsert_course_run(&course(), &run()).is_ok());
    }
}
