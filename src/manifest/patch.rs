//! Image reference patching.
//!
//! A service is updated when its name starts with the artifact's logical
//! name, so `web-1.4.tar` updates both `web-a` and `web-b`. The match is a
//! plain prefix: `web` also matches `webhook`.

use serde_yaml::Value;

use super::document::{IMAGE_KEY, ManifestDocument};

/// One image change applied to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub service: String,
    /// Previous image, `None` if the service had no string image.
    pub from: Option<String>,
    pub to: String,
}

/// Result of a patch over a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Services whose name carries the prefix, changed or not.
    pub matched: Vec<String>,
    pub updates: Vec<ServiceUpdate>,
}

impl PatchOutcome {
    /// Whether any service changed. When false the document is untouched.
    pub fn changed(&self) -> bool {
        !self.updates.is_empty()
    }
}

/// Names of services whose key starts with `logical_name`.
pub fn matching_services(document: &ManifestDocument, logical_name: &str) -> Vec<String> {
    document
        .service_names()
        .into_iter()
        .filter(|service| service.starts_with(logical_name))
        .collect()
}

/// Point every matching service at `logical_name:version`.
///
/// Only the `image` scalar of a service is written; every other key keeps
/// its value and position. Services already holding the target reference
/// are left alone, so applying the same patch twice reports no change the
/// second time.
pub fn patch_image_reference(
    document: &mut ManifestDocument,
    logical_name: &str,
    version: &str,
) -> PatchOutcome {
    let target = format!("{logical_name}:{version}");
    let mut outcome = PatchOutcome::default();

    let Some(services) = document.services_mut() else {
        return outcome;
    };

    for (key, node) in services.iter_mut() {
        let Some(service) = key.as_str() else {
            continue;
        };
        if !service.starts_with(logical_name) {
            continue;
        }
        outcome.matched.push(service.to_string());

        let Some(definition) = node.as_mapping_mut() else {
            crate::debug_event!("manifest", "skipping non-mapping service", "{service}");
            continue;
        };

        let current = definition.get(IMAGE_KEY).and_then(Value::as_str);
        if current == Some(target.as_str()) {
            continue;
        }

        let from = current.map(str::to_string);
        // Existing keys keep their position on insert
        definition.insert(Value::from(IMAGE_KEY), Value::from(target.as_str()));
        outcome.updates.push(ServiceUpdate {
            service: service.to_string(),
            from,
            to: target.clone(),
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = r#"
services:
  web-a:
    image: web:1.0
    container_name: web_a
    hostname: web-a
    networks: [front, back]
    environment:
      MODE: prod
      WORKERS: "4"
    volumes:
      - ./static:/srv/static:ro
    command: serve --port 80
    restart: unless-stopped
    labels:
      tier: edge
  web-b:
    image: web:1.0
    restart: always
  db:
    image: postgres:16
    container_name: db
  webhook:
    image: hooks:0.3
volumes:
  pgdata: {}
"#;

    fn doc() -> ManifestDocument {
        ManifestDocument::parse(COMPOSE).unwrap()
    }

    #[test]
    fn test_prefix_match_updates_every_variant() {
        let mut document = doc();
        let before = document.clone();

        let outcome = patch_image_reference(&mut document, "web", "1.4");

        let changed: Vec<&str> = outcome.updates.iter().map(|u| u.service.as_str()).collect();
        // `webhook` shares the prefix and is updated too
        assert_eq!(changed, vec!["web-a", "web-b", "webhook"]);
        assert_eq!(outcome.updates[0].from.as_deref(), Some("web:1.0"));
        assert_eq!(outcome.updates[0].to, "web:1.4");

        assert_eq!(document.service("web-a").unwrap().image.as_deref(), Some("web:1.4"));
        assert_eq!(document.service("web-b").unwrap().image.as_deref(), Some("web:1.4"));
        assert_eq!(document.service_node("db"), before.service_node("db"));
        assert_eq!(document.section("volumes"), before.section("volumes"));
    }

    #[test]
    fn test_non_image_fields_untouched() {
        let mut document = doc();
        let before = document.service("web-a").unwrap();
        let before_node = document.service_node("web-a").unwrap().clone();

        patch_image_reference(&mut document, "web", "2.0");

        let after = document.service("web-a").unwrap();
        assert_eq!(after.image.as_deref(), Some("web:2.0"));
        assert_eq!(after.container_name, before.container_name);
        assert_eq!(after.hostname, before.hostname);
        assert_eq!(after.networks, before.networks);
        assert_eq!(after.environment, before.environment);
        assert_eq!(after.volumes, before.volumes);
        assert_eq!(after.command, before.command);
        assert_eq!(after.restart, before.restart);

        // Keys outside the typed view, and key order, are preserved as well
        let after_node = document.service_node("web-a").unwrap().as_mapping().unwrap();
        let before_node = before_node.as_mapping().unwrap();
        let after_keys: Vec<_> = after_node.keys().collect();
        let before_keys: Vec<_> = before_node.keys().collect();
        assert_eq!(after_keys, before_keys);
        assert_eq!(after_node.get("labels"), before_node.get("labels"));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut document = doc();

        let first = patch_image_reference(&mut document, "db", "17");
        assert!(first.changed());
        let snapshot = document.clone();

        let second = patch_image_reference(&mut document, "db", "17");
        assert!(!second.changed());
        assert_eq!(second.matched, vec!["db"]);
        assert_eq!(document, snapshot);
    }

    #[test]
    fn test_no_matching_service_is_noop() {
        let mut document = doc();
        let before = document.clone();

        let outcome = patch_image_reference(&mut document, "cache", "2.1");
        assert!(!outcome.changed());
        assert!(outcome.matched.is_empty());
        assert_eq!(document, before);
        assert!(matching_services(&document, "cache").is_empty());
        assert_eq!(matching_services(&document, "web"), vec!["web-a", "web-b", "webhook"]);
    }

    #[test]
    fn test_service_without_image_gets_one() {
        let mut document =
            ManifestDocument::parse("services:\n  api:\n    build: .\n    restart: always\n")
                .unwrap();

        let outcome = patch_image_reference(&mut document, "api", "1.0");
        assert_eq!(
            outcome.updates,
            vec![ServiceUpdate {
                service: "api".to_string(),
                from: None,
                to: "api:1.0".to_string(),
            }]
        );
        let node = document.service_node("api").unwrap();
        assert_eq!(node.get("build").and_then(Value::as_str), Some("."));
    }
}
