use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// The object store desired state is submitted to.
///
/// Only creation is used here; update decisions are returned to the reconcile loop.
pub trait ObjectStore {
    fn create<K>(
        &self,
        namespace: &str,
        obj: &K,
    ) -> impl std::future::Future<Output = Result<K, kube::Error>> + Send
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize
            + Send
            + Sync;
}

impl ObjectStore for Client {
    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize
            + Send
            + Sync,
    {
        let api: Api<K> = Api::namespaced(self.clone(), namespace);
        api.create(&PostParams::default(), obj).await
    }
}
