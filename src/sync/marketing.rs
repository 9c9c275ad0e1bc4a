//! Marketing site publisher
//!
//! The marketing CMS is driven through its session API: a form login sets the
//! session cookie, a CSRF token is fetched from the session endpoint, then
//! nodes are looked up by uuid and created or edited.

use std::cell::RefCell;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{http, Result, SyncError};
use crate::core::catalog::{Catalog, Course, CourseRun, Partner};
use crate::core::config::IngestionConfig;

pub trait MarketingSite {
    /// Create or update the marketing node of a published run
    fn publish_run(&self, course: &Course, run: &CourseRun) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Session {
    csrf_token: String,
    user_id: String,
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    list: Vec<Value>,
}

pub struct MarketingSitePublisher {
    client: Client,
    root: String,
    username: String,
    password: String,
    session: RefCell<Option<Session>>,
}

impl MarketingSitePublisher {
    pub fn new(partner: &Partner, config: &IngestionConfig) -> Result<Self> {
        let root = partner
            .marketing_site_url_root
            .clone()
            .ok_or(SyncError::NotConfigured("partner marketing_site_url_root"))?;
        let username = config
            .marketing
            .username
            .clone()
            .or_else(|| partner.marketing_site_api_username.clone())
            .ok_or(SyncError::NotConfigured("marketing.username"))?;
        let password = config
            .marketing
            .password
            .clone()
            .or_else(|| partner.marketing_site_api_password.clone())
            .ok_or(SyncError::NotConfigured("marketing.password"))?;
        Ok(Self {
            client: http::build_client(config.http_timeout_secs, &http::api_user_agent(), None)?,
            root: root.trim_end_matches('/').to_string(),
            username,
            password,
            session: RefCell::new(None),
        })
    }

    fn session(&self) -> Result<Session> {
        if let Some(session) = self.session.borrow().as_ref() {
            return Ok(session.clone());
        }

        let login = http::join(&self.root, "/user")?;
        http::check(
            self.client
                .post(login)
                .form(&[
                    ("name", self.username.as_str()),
                    ("pass", self.password.as_str()),
                    ("form_id", "user_login"),
                    ("op", "Log in"),
                ])
                .send()?,
        )?;

        let token_url = http::join(&self.root, "/restws/session/token")?;
        let csrf_token = http::check(self.client.get(token_url).send()?)?
            .text()
            .map_err(|e| SyncError::Decode(e.to_string()))?
            .trim()
            .to_string();

        let user_url = http::join(&self.root, &format!("/user.json?name={}", self.username))?;
        let users: NodeList = http::check(self.client.get(user_url).send()?)?
            .json()
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        let user_id = users
            .list
            .first()
            .and_then(|u| u.get("uid"))
            .map(json_id)
            .ok_or_else(|| SyncError::Decode("marketing site user not found".to_string()))?;

        debug!(user = %self.username, "marketing site session established");
        let session = Session {
            csrf_token,
            user_id,
        };
        *self.session.borrow_mut() = Some(session.clone());
        Ok(session)
    }

    fn node_id(&self, session: &Session, uuid: &str) -> Result<Option<String>> {
        let url = http::join(&self.root, &format!("/node.json?field_uuid={}", uuid))?;
        let response = self
            .client
            .get(url)
            .header("X-CSRF-Token", &session.csrf_token)
            .send()?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let nodes: NodeList = response
            .json()
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        Ok(nodes.list.first().and_then(|n| n.get("nid")).map(json_id))
    }
}

fn json_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MarketingSite for MarketingSitePublisher {
    fn publish_run(&self, course: &Course, run: &CourseRun) -> Result<()> {
        let session = self.session()?;
        let mut node = json!({
            "type": "course",
            "title": run.title_override.clone().unwrap_or_else(|| course.title.clone()),
            "field_course_id": run.key,
            "field_uuid": run.uuid,
            "uuid": run.uuid,
            "author": { "id": session.user_id },
            "status": 1,
        });

        match self.node_id(&session, &run.uuid)? {
            Some(nid) => {
                // uuid cannot be changed on edit
                if let Some(map) = node.as_object_mut() {
                    map.remove("uuid");
                }
                let url = http::join(&self.root, &format!("/node.json/{}", nid))?;
                http::check(
                    self.client
                        .put(url)
                        .header("X-CSRF-Token", &session.csrf_token)
                        .json(&node)
                        .send()?,
                )?;
                info!(run = %run.key, node = %nid, "marketing node updated");
            }
            None => {
                let url = http::join(&self.root, "/node.json")?;
                http::check(
                    self.client
                        .post(url)
                        .header("X-CSRF-Token", &session.csrf_token)
                        .json(&node)
                        .send()?,
                )?;
                info!(run = %run.key, "marketing node created");
            }
        }
        Ok(())
    }
}

/// Records publications in the catalog outbox instead of calling the CMS
pub struct NoopMarketingSite<'a> {
    catalog: &'a Catalog,
}

impl<'a> NoopMarketingSite<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }
}

impl MarketingSite for NoopMarketingSite<'_> {
    fn publish_run(&self, course: &Course, run: &CourseRun) -> Result<()> {
        self.catalog.record_outbox(
            "marketing",
            "publish",
            &run.uuid,
            &json!({ "course": course.key, "course_run": run.key }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fixtures;

    fn partner(root: &str) -> Partner {
        Partner {
            id: 1,
            short_code: "edx".to_string(),
            name: "edX".to_string(),
            marketing_site_url_root: Some(root.to_string()),
            marketing_site_api_username: Some("api".to_string()),
            marketing_site_api_password: Some("secret".to_string()),
            studio_url: None,
            lms_url: None,
        }
    }

    #[test]
    fn test_requires_root_url() {
        let mut p = partner("x");
        p.marketing_site_url_root = None;
        assert!(matches!(
            MarketingSitePublisher::new(&p, &IngestionConfig::default()),
            Err(SyncError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_login_then_create_node() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", "/user")
            .match_body(mockito::Matcher::UrlEncoded("name".into(), "api".into()))
            .with_status(200)
            .create();
        let token = server
            .mock("GET", "/restws/session/token")
            .with_status(200)
            .with_body("tok123")
            .create();
        let _user = server
            .mock("GET", "/user.json")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"list":[{"uid":"7"}]}"#)
            .create();
        let _lookup = server
            .mock("GET", "/node.json")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"list":[]}"#)
            .create();
        let create = server
            .mock("POST", "/node.json")
            .match_header("x-csrf-token", "tok123")
            .with_status(201)
            .with_body(r#"{"id":"12"}"#)
            .expect(2)
            .create();

        let publisher =
            MarketingSitePublisher::new(&partner(&server.url()), &IngestionConfig::default())
                .unwrap();
        let course = fixtures::course();
        let run = fixtures::run();
        publisher.publish_run(&course, &run).unwrap();
        publisher.publish_run(&course, &run).unwrap();

        login.assert();
        token.assert();
        create.assert();
    }

    #[test]
    fn test_noop_records_publication() {
        let catalog = Catalog::open_in_memory().unwrap();
        NoopMarketingSite::new(&catalog)
            .publish_run(&fixtures::course(), &fixtures::run())
            .unwrap();
        let entries = catalog.outbox_entries("marketing").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "r-uuid");
    }
}
