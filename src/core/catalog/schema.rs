//! Database schema initialization

use rusqlite::{params, OptionalExtension};

use super::{Catalog, CatalogError, Result, SCHEMA_VERSION};

impl Catalog {
    /// Create tables if missing and verify the schema version
    pub(super) fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- Tenants
            CREATE TABLE IF NOT EXISTS partners (
                id INTEGER PRIMARY KEY,
                short_code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                marketing_site_url_root TEXT,
                marketing_site_api_username TEXT,
                marketing_site_api_password TEXT,
                studio_url TEXT,
                lms_url TEXT
            );

            CREATE TABLE IF NOT EXISTS organizations (
                id INTEGER PRIMARY KEY,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                uuid TEXT NOT NULL UNIQUE,
                key TEXT NOT NULL,
                name TEXT NOT NULL,
                logo_image_url TEXT,
                banner_image_url TEXT,
                UNIQUE (partner_id, key)
            );

            CREATE TABLE IF NOT EXISTS organization_mappings (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                organization_external_key TEXT NOT NULL,
                UNIQUE (source_id, organization_external_key)
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

            CREATE TABLE IF NOT EXISTS user_organizations (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                organization_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, organization_id)
            );

            -- Reference data
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS seat_types (
                id INTEGER PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS course_run_types (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL UNIQUE,
                is_marketable INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS course_run_type_seat_types (
                course_run_type_id INTEGER NOT NULL REFERENCES course_run_types(id) ON DELETE CASCADE,
                seat_type_id INTEGER NOT NULL REFERENCES seat_types(id),
                PRIMARY KEY (course_run_type_id, seat_type_id)
            );

            CREATE TABLE IF NOT EXISTS course_types (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS course_type_entitlement_types (
                course_type_id INTEGER NOT NULL REFERENCES course_types(id) ON DELETE CASCADE,
                seat_type_id INTEGER NOT NULL REFERENCES seat_types(id),
                PRIMARY KEY (course_type_id, seat_type_id)
            );

            CREATE TABLE IF NOT EXISTS course_type_run_types (
                course_type_id INTEGER NOT NULL REFERENCES course_types(id) ON DELETE CASCADE,
                course_run_type_id INTEGER NOT NULL REFERENCES course_run_types(id),
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (course_type_id, course_run_type_id)
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                name_es TEXT,
                UNIQUE (partner_id, slug)
            );

            CREATE TABLE IF NOT EXISTS level_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS language_tags (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS program_types (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collaborators (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS people (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                given_name TEXT NOT NULL
            );

            -- Value objects
            CREATE TABLE IF NOT EXISTS additional_metadata (
                id INTEGER PRIMARY KEY,
                external_url TEXT,
                external_identifier TEXT,
                lead_capture_form_url TEXT,
                organic_url TEXT,
                certificate_info TEXT,
                facts TEXT NOT NULL DEFAULT '[]',
                start_date TEXT,
                end_date TEXT,
                registration_deadline TEXT,
                product_status TEXT NOT NULL DEFAULT 'published',
                external_course_marketing_type TEXT,
                taxi_form_id TEXT,
                post_submit_url TEXT,
                product_meta TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_additional_metadata_external ON additional_metadata(external_identifier);

            CREATE TABLE IF NOT EXISTS geolocations (
                id INTEGER PRIMARY KEY,
                location_name TEXT NOT NULL,
                lat TEXT NOT NULL,
                lng TEXT NOT NULL,
                UNIQUE (location_name, lat, lng)
            );

            CREATE TABLE IF NOT EXISTS course_location_restrictions (
                id INTEGER PRIMARY KEY,
                restriction_type TEXT NOT NULL,
                countries TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS product_values (
                id INTEGER PRIMARY KEY,
                per_click_usa INTEGER NOT NULL DEFAULT 0,
                per_click_international INTEGER NOT NULL DEFAULT 0,
                per_lead_usa INTEGER NOT NULL DEFAULT 0,
                per_lead_international INTEGER NOT NULL DEFAULT 0
            );

            -- Courses: draft and official rows share uuid and key
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                key TEXT NOT NULL,
                draft INTEGER NOT NULL DEFAULT 1,
                draft_version_id INTEGER UNIQUE REFERENCES courses(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                short_description TEXT,
                full_description TEXT,
                outcome TEXT,
                syllabus_raw TEXT,
                prerequisites_raw TEXT,
                faq TEXT,
                learner_testimonials TEXT,
                additional_information TEXT,
                video_url TEXT,
                level_type_id INTEGER REFERENCES level_types(id),
                type_id INTEGER REFERENCES course_types(id),
                product_source_id INTEGER REFERENCES sources(id),
                image_url TEXT,
                image_hash TEXT,
                organization_logo_override_url TEXT,
                organization_short_code_override TEXT,
                canonical_course_run_id INTEGER UNIQUE REFERENCES course_runs(id) ON DELETE SET NULL,
                additional_metadata_id INTEGER REFERENCES additional_metadata(id),
                geolocation_id INTEGER REFERENCES geolocations(id),
                location_restriction_id INTEGER REFERENCES course_location_restrictions(id),
                in_year_value_id INTEGER REFERENCES product_values(id),
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                UNIQUE (partner_id, key, draft),
                UNIQUE (uuid, draft)
            );
            CREATE INDEX IF NOT EXISTS idx_courses_key ON courses(key);
            CREATE INDEX IF NOT EXISTS idx_courses_uuid ON courses(uuid);

            CREATE TABLE IF NOT EXISTS course_url_slugs (
                id INTEGER PRIMARY KEY,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                course_uuid TEXT NOT NULL,
                url_slug TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL,
                UNIQUE (partner_id, url_slug)
            );
            CREATE INDEX IF NOT EXISTS idx_course_url_slugs_course ON course_url_slugs(course_uuid);

            CREATE TABLE IF NOT EXISTS course_authoring_orgs (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                organization_id INTEGER NOT NULL REFERENCES organizations(id),
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (course_id, organization_id)
            );

            CREATE TABLE IF NOT EXISTS course_subjects (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                subject_id INTEGER NOT NULL REFERENCES subjects(id),
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (course_id, subject_id)
            );

            CREATE TABLE IF NOT EXISTS course_collaborators (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                collaborator_id INTEGER NOT NULL REFERENCES collaborators(id),
                PRIMARY KEY (course_id, collaborator_id)
            );

            CREATE TABLE IF NOT EXISTS course_runs (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                draft INTEGER NOT NULL DEFAULT 1,
                draft_version_id INTEGER UNIQUE REFERENCES course_runs(id) ON DELETE SET NULL,
                title_override TEXT,
                start_at TEXT,
                end_at TEXT,
                go_live_date TEXT,
                upgrade_deadline_override TEXT,
                enrollment_end TEXT,
                pacing_type TEXT,
                status TEXT NOT NULL DEFAULT 'unpublished',
                type_id INTEGER REFERENCES course_run_types(id),
                content_language TEXT REFERENCES language_tags(code),
                weeks_to_complete INTEGER,
                min_effort INTEGER,
                max_effort INTEGER,
                expected_program_type TEXT,
                expected_program_name TEXT,
                variant_id TEXT,
                restriction_type TEXT,
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                UNIQUE (key, draft),
                UNIQUE (uuid, draft)
            );
            CREATE INDEX IF NOT EXISTS idx_course_runs_course ON course_runs(course_id);
            CREATE INDEX IF NOT EXISTS idx_course_runs_variant ON course_runs(variant_id);

            CREATE TABLE IF NOT EXISTS course_run_staff (
                course_run_id INTEGER NOT NULL REFERENCES course_runs(id) ON DELETE CASCADE,
                person_id INTEGER NOT NULL REFERENCES people(id),
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (course_run_id, person_id)
            );

            CREATE TABLE IF NOT EXISTS course_run_transcript_languages (
                course_run_id INTEGER NOT NULL REFERENCES course_runs(id) ON DELETE CASCADE,
                language_code TEXT NOT NULL REFERENCES language_tags(code),
                PRIMARY KEY (course_run_id, language_code)
            );

            CREATE TABLE IF NOT EXISTS seats (
                id INTEGER PRIMARY KEY,
                course_run_id INTEGER NOT NULL REFERENCES course_runs(id) ON DELETE CASCADE,
                draft INTEGER NOT NULL DEFAULT 1,
                draft_version_id INTEGER UNIQUE REFERENCES seats(id) ON DELETE SET NULL,
                type_slug TEXT NOT NULL,
                price TEXT NOT NULL DEFAULT '0.00',
                currency TEXT NOT NULL DEFAULT 'USD',
                sku TEXT,
                UNIQUE (course_run_id, type_slug)
            );

            CREATE TABLE IF NOT EXISTS entitlements (
                id INTEGER PRIMARY KEY,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                draft INTEGER NOT NULL DEFAULT 1,
                draft_version_id INTEGER UNIQUE REFERENCES entitlements(id) ON DELETE SET NULL,
                mode TEXT NOT NULL,
                price TEXT NOT NULL DEFAULT '0.00',
                currency TEXT NOT NULL DEFAULT 'USD',
                sku TEXT,
                UNIQUE (course_id, mode)
            );

            -- Programs and degrees
            CREATE TABLE IF NOT EXISTS programs (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                partner_id INTEGER NOT NULL REFERENCES partners(id),
                title TEXT NOT NULL,
                type_id INTEGER REFERENCES program_types(id),
                status TEXT NOT NULL DEFAULT 'unpublished',
                marketing_slug TEXT,
                overview TEXT,
                card_image_url TEXT,
                card_image_hash TEXT,
                organization_logo_override_url TEXT,
                organization_short_code_override TEXT,
                primary_subject_override_id INTEGER REFERENCES subjects(id),
                level_type_override_id INTEGER REFERENCES level_types(id),
                language_override TEXT REFERENCES language_tags(code),
                product_source_id INTEGER REFERENCES sources(id),
                is_degree INTEGER NOT NULL DEFAULT 0,
                geolocation_id INTEGER REFERENCES geolocations(id),
                in_year_value_id INTEGER REFERENCES product_values(id),
                created TEXT NOT NULL,
                modified TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS program_authoring_orgs (
                program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
                organization_id INTEGER NOT NULL REFERENCES organizations(id),
                PRIMARY KEY (program_id, organization_id)
            );

            CREATE TABLE IF NOT EXISTS program_location_restrictions (
                id INTEGER PRIMARY KEY,
                program_id INTEGER NOT NULL UNIQUE REFERENCES programs(id) ON DELETE CASCADE,
                restriction_type TEXT NOT NULL,
                countries TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS degree_additional_metadata (
                id INTEGER PRIMARY KEY,
                degree_id INTEGER NOT NULL UNIQUE REFERENCES programs(id) ON DELETE CASCADE,
                external_identifier TEXT,
                organic_url TEXT,
                external_url TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_degree_metadata_external ON degree_additional_metadata(external_identifier);

            CREATE TABLE IF NOT EXISTS specializations (
                id INTEGER PRIMARY KEY,
                value TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS degree_specializations (
                degree_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
                specialization_id INTEGER NOT NULL REFERENCES specializations(id),
                PRIMARY KEY (degree_id, specialization_id)
            );

            CREATE TABLE IF NOT EXISTS curricula (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                program_id INTEGER NOT NULL UNIQUE REFERENCES programs(id) ON DELETE CASCADE,
                marketing_text TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- Editors
            CREATE TABLE IF NOT EXISTS course_editors (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                UNIQUE (user_id, course_id)
            );

            -- Downloaded images, keyed by content hash
            CREATE TABLE IF NOT EXISTS images (
                hash TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                content_type TEXT,
                byte_len INTEGER NOT NULL,
                data BLOB NOT NULL,
                created TEXT NOT NULL
            );

            -- Re-index requests consumed by the search indexer
            CREATE TABLE IF NOT EXISTS index_queue (
                id INTEGER PRIMARY KEY,
                entity_kind TEXT NOT NULL,
                entity_uuid TEXT NOT NULL,
                batch TEXT,
                requested_at TEXT NOT NULL
            );

            -- Calls recorded for collaborators running in local mode
            CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY,
                channel TEXT NOT NULL,
                action TEXT NOT NULL,
                target TEXT NOT NULL,
                payload TEXT NOT NULL,
                created TEXT NOT NULL
            );
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match version {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(CatalogError::SchemaMismatch {
                found: v,
                expected: SCHEMA_VERSION,
            }),
        }
    }
}
