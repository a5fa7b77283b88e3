mod common;

#[cfg(test)]
mod tests {
    use crate::common::{User, registry, registry_with};
    use gantry_core::{EngineError, MutationKind, validate_entity};

    fn user(name: &str) -> User {
        User {
            id: 0,
            name: name.into(),
            is_active: true,
        }
    }

    #[test]
    fn valid_entity_passes() {
        let registry = registry();
        let mapping = registry.mapping::<User>().unwrap();
        assert!(validate_entity(&mapping, &user("Ada"), MutationKind::Insert).is_ok());
        assert!(validate_entity(&mapping, &user("Ada"), MutationKind::Update).is_ok());
    }

    #[test]
    fn required_null_fails() {
        let registry = registry_with(|m| {
            // Drop the length bounds so the only violation left is the null.
            m.entity::<User>(|e| {
                e.property("name", |p| {
                    p.min_length(0);
                });
            });
        });
        let mapping = registry.mapping::<User>().unwrap();
        let error = validate_entity(&mapping, &NullName, MutationKind::Insert).unwrap_err();
        match error {
            EngineError::Validation { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].property, "name");
                assert!(errors[0].message.contains("required"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    /// Stand-in entity whose `name` reads back as null.
    struct NullName;

    impl gantry_core::Entity for NullName {
        fn descriptor() -> &'static gantry_core::EntityDescriptor {
            User::descriptor()
        }
        fn from_row(_row: &gantry_core::RowLabeled) -> gantry_core::Result<Self> {
            Ok(NullName)
        }
        fn value_of(&self, property: &str) -> Option<gantry_core::Value> {
            match property {
                "name" => Some(gantry_core::Value::Varchar(None)),
                "is_active" => Some(gantry_core::Value::Boolean(Some(true))),
                _ => None,
            }
        }
        fn set_value(
            &mut self,
            _property: &str,
            _value: gantry_core::Value,
        ) -> gantry_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn length_bounds_are_checked() {
        let registry = registry();
        let mapping = registry.mapping::<User>().unwrap();

        let error = validate_entity(&mapping, &user("A"), MutationKind::Insert).unwrap_err();
        match error {
            EngineError::Validation { errors, .. } => {
                assert!(errors[0].message.contains("below minimum"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }

        let long = "x".repeat(51);
        let error = validate_entity(&mapping, &user(&long), MutationKind::Insert).unwrap_err();
        match error {
            EngineError::Validation { errors, .. } => {
                assert!(errors[0].message.contains("exceeds maximum"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }

        assert!(validate_entity(&mapping, &user(&"x".repeat(50)), MutationKind::Insert).is_ok());
    }

    #[test]
    fn read_only_mapping_rejects_writes() {
        let registry = registry_with(|m| {
            m.entity::<User>(|e| {
                e.read_only();
            });
        });
        let mapping = registry.mapping::<User>().unwrap();
        let error = validate_entity(&mapping, &user("Ada"), MutationKind::Insert).unwrap_err();
        assert!(matches!(error, EngineError::ReadOnly { .. }));
    }

    #[test]
    fn generated_and_key_properties_are_skipped_on_update() {
        let registry = registry();
        let mapping = registry.mapping::<User>().unwrap();
        // `id` is both generated and the key; nothing about it is validated.
        let entity = User {
            id: -1,
            name: "Ada".into(),
            is_active: false,
        };
        assert!(validate_entity(&mapping, &entity, MutationKind::Update).is_ok());
    }
}
