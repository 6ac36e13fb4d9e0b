//! Typed field registry exposed through the settings endpoint.

mod field;

pub use field::{shared, Bounded, Field, Policy, Shared};

use serde_json::{Map, Value};

pub struct Parameter {
    pub name: String,
    pub policy: Policy,
    pub field: Field,
}

/// Fields in registration order.
#[derive(Default)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field. A duplicate name is logged and ignored.
    pub fn add_parameter(&mut self, name: &str, field: Field, policy: Policy) -> bool {
        if self.params.iter().any(|p| p.name == name) {
            log::error!("Parameter {:?} already registered, ignoring", name);
            return false;
        }
        log::debug!("Registered parameter {:?} ({:?}, {} bytes)", name, policy, field.size());
        self.params.push(Parameter {
            name: name.to_string(),
            policy,
            field,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Current values of every readable field.
    pub fn export_json(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter(|p| p.policy.readable())
            .map(|p| (p.name.clone(), p.field.to_json()))
            .collect()
    }

    /// Apply matching keys to writable fields. Unknown keys and read-only
    /// fields are skipped; returns how many fields changed.
    pub fn import_json(&self, obj: &Map<String, Value>) -> usize {
        let mut applied = 0;
        for p in self.params.iter().filter(|p| p.policy.writable()) {
            let Some(value) = obj.get(&p.name) else {
                continue;
            };
            if p.field.from_json(value) {
                applied += 1;
            } else {
                log::warn!("Ignoring value {} for parameter {:?}", value, p.name);
            }
        }
        applied
    }

    pub fn clear_all(&self) {
        for p in &self.params {
            p.field.clear_data();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Config {
        name: [u8; 20],
        enabled: bool,
        hour: i8,
        password: [u8; 20],
    }

    #[derive(Default)]
    struct Metadata {
        version: i8,
    }

    fn registry() -> (ParameterRegistry, Shared<Config>, Shared<Metadata>) {
        let config = shared(Config::default());
        let meta = shared(Metadata { version: 3 });
        let mut reg = ParameterRegistry::new();
        reg.add_parameter(
            "name",
            Field::text(&config, |c: &mut Config| &mut c.name),
            Policy::ReadOnly,
        );
        reg.add_parameter(
            "enabled",
            Field::bool(&config, |c: &mut Config| &mut c.enabled),
            Policy::ReadWrite,
        );
        reg.add_parameter(
            "hour",
            Field::int(&config, |c: &mut Config| &mut c.hour),
            Policy::ReadWrite,
        );
        reg.add_parameter(
            "password",
            Field::text(&config, |c: &mut Config| &mut c.password),
            Policy::WriteOnly,
        );
        reg.add_parameter(
            "version",
            Field::int(&meta, |m: &mut Metadata| &mut m.version),
            Policy::ReadOnly,
        );
        (reg, config, meta)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut reg, config, _) = registry();
        assert!(!reg.add_parameter(
            "hour",
            Field::bool(&config, |c: &mut Config| &mut c.enabled),
            Policy::ReadWrite,
        ));
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.get("hour").map(|p| p.field.size()), Some(1));
    }

    #[test]
    fn test_export_keeps_order_and_hides_write_only() {
        let (reg, _, _) = registry();
        let exported = reg.export_json();
        let keys: Vec<_> = exported.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "enabled", "hour", "version"]);
        assert!(!exported.contains_key("password"));
        assert_eq!(exported["version"], json!(3));
        assert_eq!(
            reg.names().collect::<Vec<_>>(),
            vec!["name", "enabled", "hour", "password", "version"]
        );
    }

    #[test]
    fn test_import_skips_read_only() {
        let (reg, config, meta) = registry();
        let body = json!({
            "name": "intruder",
            "enabled": true,
            "password": "hunter2",
            "version": 99,
            "unknown": 1
        });
        let applied = reg.import_json(body.as_object().unwrap());
        assert_eq!(applied, 2);

        let c = config.borrow();
        assert_eq!(c.name, [0; 20]);
        assert!(c.enabled);
        assert_eq!(&c.password[..7], b"hunter2");
        assert_eq!(meta.borrow().version, 3);
    }

    #[test]
    fn test_missing_keys_leave_fields() {
        let (reg, config, _) = registry();
        config.borrow_mut().hour = 7;
        reg.import_json(json!({ "enabled": true }).as_object().unwrap());
        assert_eq!(config.borrow().hour, 7);
    }

    #[test]
    fn test_clear_all() {
        let (reg, config, meta) = registry();
        config.borrow_mut().enabled = true;
        config.borrow_mut().hour = 5;
        reg.clear_all();
        assert!(!config.borrow().enabled);
        assert_eq!(config.borrow().hour, 0);
        assert_eq!(meta.borrow().version, 0);
    }
}
