//! Resource Graph Walker
//!
//! The only component that talks to the WBEM collaborator. Each operation
//! is a thin, retry-free pass-through; zero results are an empty vector,
//! never an error.

use crate::domain::ports::{
    AssociationQuery, Instance, InvokeOutput, ObjectPath, ParamValue, WbemClientRef,
};
use crate::error::Result;
use tracing::{debug, trace};

/// Read (and invoke) access to the array's live object graph
#[derive(Clone)]
pub struct ResourceGraph {
    client: WbemClientRef,
}

impl ResourceGraph {
    pub fn new(client: WbemClientRef) -> Self {
        Self { client }
    }

    /// All instances of a class, unfiltered
    pub async fn enumerate_names(&self, class_name: &str) -> Result<Vec<ObjectPath>> {
        let names = self.client.enumerate_instance_names(class_name).await?;
        debug!(
            "EnumerateInstanceNames {} on {}: {} instances",
            class_name,
            self.client.endpoint(),
            names.len()
        );
        Ok(names)
    }

    /// Objects related to `from` through the association described by `query`
    pub async fn associated_names(
        &self,
        from: &ObjectPath,
        query: &AssociationQuery,
    ) -> Result<Vec<ObjectPath>> {
        let names = self.client.associator_names(from, query).await?;
        debug!(
            "AssociatorNames {} -> {}: {} results",
            from,
            query.result_class.as_deref().unwrap_or("*"),
            names.len()
        );
        Ok(names)
    }

    /// Shorthand for an unrestricted traversal filtered by result class
    pub async fn associated_of_class(
        &self,
        from: &ObjectPath,
        result_class: &str,
    ) -> Result<Vec<ObjectPath>> {
        self.associated_names(from, &AssociationQuery::result(result_class))
            .await
    }

    /// Full property bag of one object
    pub async fn get_instance(&self, path: &ObjectPath) -> Result<Instance> {
        let instance = self.client.get_instance(path).await?;
        trace!("GetInstance {}: {} properties", path, instance.properties.len());
        Ok(instance)
    }

    /// Raw InvokeMethod; mutating callers go through the job tracker
    pub(crate) async fn invoke(
        &self,
        target: &ObjectPath,
        method: &str,
        params: Vec<ParamValue>,
    ) -> Result<InvokeOutput> {
        let output = self.client.invoke_method(target, method, params).await?;
        debug!(
            "InvokeMethod {} on {}: return code {}",
            method, target, output.return_code
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::classes;
    use crate::simulator::SimulatedArray;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_association_is_not_an_error() {
        let array = SimulatedArray::new();
        let system = array.add_system("000196701380", 5978);
        let graph = ResourceGraph::new(Arc::new(array));

        let views = graph
            .associated_of_class(&system, classes::MASKING_VIEW)
            .await
            .unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_enumerate_and_get_instance() {
        let array = SimulatedArray::new();
        let system = array.add_system("000196701380", 5978);
        let graph = ResourceGraph::new(Arc::new(array));

        let systems = graph.enumerate_names(classes::STORAGE_SYSTEM).await.unwrap();
        assert_eq!(systems, vec![system.clone()]);

        let instance = graph.get_instance(&system).await.unwrap();
        assert_eq!(instance.str_property("ElementName").unwrap(), "000196701380");
    }

    #[tokio::test]
    async fn test_unknown_class_is_an_error() {
        let graph = ResourceGraph::new(Arc::new(SimulatedArray::new()));
        assert!(graph.enumerate_names("Bogus_Class").await.is_err());
    }
}
