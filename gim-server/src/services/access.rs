use std::collections::BTreeSet;

use jsonschema::JSONSchema;
use mockall::automock;
use serde_json::Value;
use tracing::debug;

use gim_slo::{errors, Result};
use gim_storage::{
    resource::{Definition, Owner, Resource, Scope},
    GraphStore,
};

use super::resolver::{user_groups, ResolveOpts};

/// Checks payloads against the JSON schema of their definition.
#[automock]
pub trait SchemaValidator: Send + Sync {
    fn validate(
        &self,
        schema: &Value,
        payload: &Value,
    ) -> std::result::Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(
        &self,
        schema: &Value,
        payload: &Value,
    ) -> std::result::Result<(), String> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|err| format!("invalid schema: {}", err))?;
        if let Err(errs) = compiled.validate(payload) {
            let details: Vec<String> = errs.map(|e| e.to_string()).collect();
            return Err(details.join("; "));
        }
        Ok(())
    }
}

/// Who is asking, with effective memberships already resolved.
#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub user_id: String,
    pub system_admin: bool,
    pub groups: BTreeSet<String>,
}

impl Requester {
    pub async fn resolve<S: GraphStore>(
        store: &S,
        user_id: &str,
        system_admin: bool,
        opts: &ResolveOpts,
    ) -> Result<Self> {
        Ok(Self {
            user_id: user_id.to_owned(),
            system_admin,
            groups: user_groups(store, user_id, opts).await?,
        })
    }
}

/// The resource an operation acts on.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A lookup result; `None` when the resource does not exist.
    Existing(Option<&'a Resource>),
    /// A resource about to be created, with its raw owner reference.
    Pending {
        payload: &'a Value,
        owner: Option<&'a Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyCause {
    NotFound,
    Forbidden,
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyCause),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(cause) => Err(cause.into()),
        }
    }
}

impl From<DenyCause> for errors::WithBacktrace {
    fn from(cause: DenyCause) -> Self {
        match cause {
            DenyCause::NotFound => errors::not_found("resource"),
            DenyCause::Forbidden => errors::forbidden("no grant matched"),
            DenyCause::Validation(msg) => errors::bad_request(&msg),
        }
    }
}

/// Decodes a proposed owner reference. System-scoped kinds may only be
/// owned by groups.
pub fn parse_owner(
    definition: &Definition,
    raw: Option<&Value>,
) -> Result<Option<Owner>, DenyCause> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let owner = Owner::from_value(raw)
        .map_err(|err| DenyCause::Validation(err.to_string()))?;
    if definition.scope == Scope::System && matches!(owner, Owner::User(_)) {
        return Err(DenyCause::Validation(format!(
            "{} resources must be owned by a group",
            definition.name
        )));
    }
    Ok(Some(owner))
}

fn owns(requester: &Requester, scope: Scope, owner: &Owner) -> bool {
    match owner {
        Owner::Group(group_id) => requester.groups.contains(group_id),
        Owner::User(user_id) => {
            scope == Scope::User && user_id == &requester.user_id
        }
    }
}

/// Decides whether `requester` may act on `target`. First match wins:
/// system admin, then the definition's admin group, then ownership.
///
/// Pending payloads are checked against the definition schema and their
/// owner reference is decoded before any grant is considered.
pub fn authorize<V>(
    validator: &V,
    requester: &Requester,
    definition: &Definition,
    target: Target<'_>,
) -> Decision
where
    V: SchemaValidator + ?Sized,
{
    let owner = match target {
        Target::Existing(None) => return Decision::Deny(DenyCause::NotFound),
        Target::Existing(Some(resource)) => resource.owner.clone(),
        Target::Pending { payload, owner } => {
            if let Err(msg) = validator.validate(&definition.schema, payload) {
                return Decision::Deny(DenyCause::Validation(msg));
            }
            match parse_owner(definition, owner) {
                Ok(owner) => owner,
                Err(cause) => return Decision::Deny(cause),
            }
        }
    };

    if requester.system_admin {
        return Decision::Allow;
    }
    if let Some(admin_group) = &definition.admin_group {
        if requester.groups.contains(admin_group) {
            return Decision::Allow;
        }
    }
    if let Some(owner) = &owner {
        if owns(requester, definition.scope, owner) {
            return Decision::Allow;
        }
    }
    debug!(
        user_id = %requester.user_id,
        definition = %definition.name,
        "no grant matched"
    );
    Decision::Deny(DenyCause::Forbidden)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition(scope: Scope) -> Definition {
        Definition {
            id: "1".to_owned(),
            name: "dashboard".to_owned(),
            schema: json!({
                "type": "object",
                "required": ["title"],
                "properties": {"title": {"type": "string"}}
            }),
            scope,
            admin_group: Some("admins".to_owned()),
        }
    }

    fn requester(groups: &[&str]) -> Requester {
        Requester {
            user_id: "u1".to_owned(),
            system_admin: false,
            groups: groups.iter().map(|g| (*g).to_owned()).collect(),
        }
    }

    fn resource(owner: Option<Owner>) -> Resource {
        Resource {
            id: "r1".to_owned(),
            definition_id: "1".to_owned(),
            owner,
            ..Default::default()
        }
    }

    #[test]
    fn precedence() {
        let validator = JsonSchemaValidator;
        let def = definition(Scope::User);
        let owned = resource(Some(Owner::Group("team".to_owned())));

        let mut admin = requester(&[]);
        admin.system_admin = true;
        assert!(authorize(&validator, &admin, &def, Target::Existing(Some(&owned)))
            .is_allowed());

        let group_admin = requester(&["admins"]);
        assert!(authorize(
            &validator,
            &group_admin,
            &def,
            Target::Existing(Some(&owned))
        )
        .is_allowed());

        let member = requester(&["team"]);
        assert!(authorize(&validator, &member, &def, Target::Existing(Some(&owned)))
            .is_allowed());

        let outsider = requester(&["other"]);
        assert_eq!(
            authorize(&validator, &outsider, &def, Target::Existing(Some(&owned))),
            Decision::Deny(DenyCause::Forbidden)
        );
        assert_eq!(
            authorize(&validator, &admin, &def, Target::Existing(None)),
            Decision::Deny(DenyCause::NotFound)
        );
    }

    #[test]
    fn user_owner_only_for_user_scope() {
        let validator = JsonSchemaValidator;
        let mine = resource(Some(Owner::User("u1".to_owned())));
        let me = requester(&[]);
        assert!(authorize(
            &validator,
            &me,
            &definition(Scope::User),
            Target::Existing(Some(&mine))
        )
        .is_allowed());
        assert_eq!(
            authorize(
                &validator,
                &me,
                &definition(Scope::System),
                Target::Existing(Some(&mine))
            ),
            Decision::Deny(DenyCause::Forbidden)
        );
    }

    #[test]
    fn pending_payload_validated_first() {
        let validator = JsonSchemaValidator;
        let mut admin = requester(&[]);
        admin.system_admin = true;
        let def = definition(Scope::System);

        let bad = json!({"title": 7});
        let decision = authorize(
            &validator,
            &admin,
            &def,
            Target::Pending {
                payload: &bad,
                owner: None,
            },
        );
        assert!(matches!(decision, Decision::Deny(DenyCause::Validation(_))));

        let good = json!({"title": "ok"});
        let user_owner = json!({"kind": "user", "id": "u1"});
        let decision = authorize(
            &validator,
            &admin,
            &def,
            Target::Pending {
                payload: &good,
                owner: Some(&user_owner),
            },
        );
        assert!(matches!(decision, Decision::Deny(DenyCause::Validation(_))));

        let malformed = json!({"kind": "robot"});
        let decision = authorize(
            &validator,
            &requester(&["team"]),
            &definition(Scope::User),
            Target::Pending {
                payload: &good,
                owner: Some(&malformed),
            },
        );
        assert!(matches!(decision, Decision::Deny(DenyCause::Validation(_))));

        let group_owner = json!({"kind": "group", "id": "team"});
        let decision = authorize(
            &validator,
            &requester(&["team"]),
            &def,
            Target::Pending {
                payload: &good,
                owner: Some(&group_owner),
            },
        );
        assert_eq!(decision, Decision::Allow);
        assert_eq!(
            authorize(
                &validator,
                &requester(&["team"]),
                &def,
                Target::Pending {
                    payload: &good,
                    owner: None,
                },
            ),
            Decision::Deny(DenyCause::Forbidden)
        );
    }

    #[test]
    fn validator_collaborator_is_consulted() {
        let mut validator = MockSchemaValidator::new();
        validator
            .expect_validate()
            .times(1)
            .returning(|_, _| Err("rejected".to_owned()));
        let payload = json!({});
        let decision = authorize(
            &validator,
            &requester(&["admins"]),
            &definition(Scope::User),
            Target::Pending {
                payload: &payload,
                owner: None,
            },
        );
        assert_eq!(
            decision,
            Decision::Deny(DenyCause::Validation("rejected".to_owned()))
        );
        assert_eq!(
            decision.into_result().unwrap_err(),
            errors::bad_request("x")
        );
        assert_eq!(
            Decision::Deny(DenyCause::Forbidden).into_result().unwrap_err(),
            errors::forbidden("x")
        );
    }
}
