use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::cluster::ClusterAccessor;
use crate::error::{PlaybookError, Result};
use crate::playbook::{Check, Condition, ObjectRef, Operand};
use crate::template;

/// Evaluates conditions against the cluster behind a [`ClusterAccessor`].
pub struct ConditionEvaluator<'a> {
    accessor: &'a dyn ClusterAccessor,
    cancel: CancellationToken,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(accessor: &'a dyn ClusterAccessor, cancel: CancellationToken) -> Self {
        Self { accessor, cancel }
    }

    /// Logical AND over `conditions`. An empty set holds vacuously.
    pub async fn is_fulfilled(&self, conditions: &[Condition]) -> Result<bool> {
        Ok(self.first_unfulfilled(conditions).await?.is_none())
    }

    /// The first condition that does not hold. Conditions after it are not
    /// evaluated.
    pub async fn first_unfulfilled<'c>(
        &self,
        conditions: &'c [Condition],
    ) -> Result<Option<&'c Condition>> {
        for condition in conditions {
            let fulfilled = self.check(&condition.check).await?;
            tracing::debug!(check = %condition.check.describe(), fulfilled, "condition evaluated");
            if !fulfilled {
                return Ok(Some(condition));
            }
        }
        Ok(None)
    }

    async fn check(&self, check: &Check) -> Result<bool> {
        match check {
            Check::CustomResourceDefinitionExists { name } => {
                let names = cancellable(
                    &self.cancel,
                    self.accessor.custom_resource_definition_names(),
                )
                .await?;
                Ok(names.contains(name))
            }
            Check::ServiceReady { name, namespace } => {
                cancellable(&self.cancel, self.accessor.is_service_ready(name, namespace)).await
            }
            Check::Compare { value, with } => {
                let left = self.resolve(value).await?;
                let right = self.resolve(with).await?;
                tracing::trace!(%left, %right, "compare");
                Ok(left == right)
            }
        }
    }

    async fn resolve(&self, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Scalar(s) => Ok(s.clone()),
            Operand::Object(obj) => self.resolve_object(obj).await,
        }
    }

    async fn resolve_object(&self, obj: &ObjectRef) -> Result<String> {
        let resource = cancellable(
            &self.cancel,
            self.accessor.resolve_resource_kind(&obj.api_version, &obj.kind),
        )
        .await?
        .ok_or_else(|| PlaybookError::ResourceKindNotFound {
            api_version: obj.api_version.clone(),
            kind: obj.kind.clone(),
        })?;

        let document = cancellable(
            &self.cancel,
            self.accessor.get_object(&resource, &obj.namespace, &obj.name),
        )
        .await?
        .ok_or_else(|| PlaybookError::ObjectNotFound {
            kind: obj.kind.clone(),
            namespace: obj.namespace.clone(),
            name: obj.name.clone(),
        })?;

        template::render(&obj.template, &document)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
