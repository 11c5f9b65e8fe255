//! Attribute mutator - writes the access flag on directory objects
//!
//! All directory traffic goes through one gateway so the session is re-bound
//! lazily. Datatype conversion failures are ambiguous on their own; the schema
//! lookup below tells "attribute missing" apart from "wrong value type".

use std::sync::Arc;

use tracing::debug;

use crate::common::classifier::{self, SYNTAX_NOT_IN_SCHEMA};
use crate::common::{AccessDecision, ClassifiedError, ErrorKind, ObjectRef};
use crate::kernel::{AuthenticatedGateway, BaseDirectoryClient};

pub struct AttributeMutator {
    directory: AuthenticatedGateway<dyn BaseDirectoryClient>,
    attribute: String,
}

impl AttributeMutator {
    pub fn new(directory: Arc<dyn BaseDirectoryClient>, attribute: impl Into<String>) -> Self {
        Self {
            directory: AuthenticatedGateway::new("active_roles", directory),
            attribute: attribute.into(),
        }
    }

    /// The directory attribute carrying the access flag.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Confirm the configured attribute exists in the directory schema.
    ///
    /// Returns its schema syntax. An attribute that is not in the schema is a
    /// `SchemaMissing` failure.
    pub async fn validate_attribute(&self) -> Result<u32, ClassifiedError> {
        let context = ObjectRef::attribute(&self.attribute);
        let syntax = self
            .directory
            .call(&context, |d| d.attribute_schema_syntax(&self.attribute))
            .await?;

        if syntax == SYNTAX_NOT_IN_SCHEMA {
            return Err(ClassifiedError::new(
                ErrorKind::SchemaMissing,
                "Attribute does not exist in schema.",
                Some(context),
            ));
        }

        debug!(attribute = %self.attribute, syntax, "Access attribute found in schema");
        Ok(syntax)
    }

    /// Write the flag value for `decision` on the object at `object_dn`.
    pub async fn set_access_flag(
        &self,
        object_dn: &str,
        decision: AccessDecision,
    ) -> Result<(), ClassifiedError> {
        let value = decision.flag_value();
        let context = ObjectRef::write(object_dn, &self.attribute, value);

        match self
            .directory
            .invoke(|d| d.set_attribute(object_dn, &self.attribute, value))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if classifier::is_datatype_conversion_failure(&e) => {
                Err(self.resolve_conversion_failure(&context).await)
            }
            Err(e) => Err(classifier::classify(&e, &context)),
        }
    }

    async fn resolve_conversion_failure(&self, context: &ObjectRef) -> ClassifiedError {
        let lookup = self
            .directory
            .call(&ObjectRef::attribute(&self.attribute), |d| {
                d.attribute_schema_syntax(&self.attribute)
            })
            .await;

        match lookup {
            Ok(syntax) => classifier::classify_conversion_failure(syntax, context),
            Err(e) => e.while_doing(&format!(
                "Looking up the schema of {} after a failed write ({})",
                self.attribute, context
            )),
        }
    }
}
