//! Admission webhook registration and handlers
//!
//! Every served kind gets a defaulting route (`/mutate-<kind>`) and a
//! validating route (`/validate-<kind>`), matching the paths the
//! WebhookConfiguration manifests point at. Registration is fail-fast: a
//! duplicate route aborts bootstrap before the server binds.

use std::sync::Arc;

use axum::routing::{post, MethodRouter};
use axum::{Json, Router};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, info, warn};

use metal3_common::crd::{
    Metal3Cluster, Metal3Data, Metal3DataClaim, Metal3DataTemplate, Metal3Machine,
    Metal3MachineTemplate, Metal3Remediation, Metal3RemediationTemplate,
};
use metal3_common::kinds::{ResourceKind, ALL_RESOURCE_KINDS};
use metal3_common::Error;

use crate::metrics::Metrics;

/// Shared state for the admission handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    /// Metric handles
    pub metrics: Metrics,
}

/// Builds the admission router one kind at a time
pub struct WebhookRegistry {
    state: Arc<WebhookState>,
    router: Router,
    routes: Vec<String>,
    registered: Vec<&'static str>,
}

impl std::fmt::Debug for WebhookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRegistry")
            .field("registered", &self.registered)
            .finish()
    }
}

impl WebhookRegistry {
    /// Empty registry
    pub fn new(state: Arc<WebhookState>) -> Self {
        Self {
            state,
            router: Router::new(),
            routes: Vec::new(),
            registered: Vec::new(),
        }
    }

    /// Register the mutate and validate routes for one kind
    pub fn register(&mut self, kind: ResourceKind) -> Result<(), Error> {
        let mutate_path = format!("/mutate-{}", kind.singular());
        let validate_path = format!("/validate-{}", kind.singular());
        if self.routes.contains(&mutate_path) {
            return Err(Error::registration(
                kind.kind_str(),
                format!("duplicate webhook route {mutate_path}"),
            ));
        }

        let router = std::mem::take(&mut self.router);
        self.router = router
            .route(&mutate_path, mutate_route(kind, Arc::clone(&self.state)))
            .route(&validate_path, validate_route(kind, Arc::clone(&self.state)));

        info!(webhook = kind.kind_str(), mutate = %mutate_path, validate = %validate_path, "Webhook registered");
        self.routes.push(mutate_path);
        self.routes.push(validate_path);
        self.registered.push(kind.kind_str());
        Ok(())
    }

    /// Register every served kind, stopping at the first failure
    pub fn register_all(&mut self) -> Result<(), Error> {
        for kind in ALL_RESOURCE_KINDS {
            self.register(*kind)?;
        }
        Ok(())
    }

    /// Kind names registered so far, in order
    pub fn registered(&self) -> &[&'static str] {
        &self.registered
    }

    /// Hand the assembled router to the webhook server
    pub fn into_router(self) -> Router {
        self.router
    }
}

fn mutate_route(kind: ResourceKind, state: Arc<WebhookState>) -> MethodRouter {
    post(move |Json(review): Json<AdmissionReview<DynamicObject>>| async move {
        let path = format!("/mutate-{}", kind.singular());
        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(e) => {
                warn!(webhook = kind.kind_str(), error = %e, "Malformed admission review");
                state
                    .metrics
                    .admission_reviews
                    .with_label_values(&[&path, "invalid"])
                    .inc();
                return Json(AdmissionResponse::invalid(e.to_string()).into_review());
            }
        };

        debug!(
            webhook = kind.kind_str(),
            uid = %req.uid,
            operation = ?req.operation,
            "Defaulting admission review"
        );
        // Defaults are applied by the API server from the CRD schema; the
        // mutating hook only has to acknowledge the object.
        let response = AdmissionResponse::from(&req);
        state
            .metrics
            .admission_reviews
            .with_label_values(&[&path, "allowed"])
            .inc();
        Json(response.into_review())
    })
}

fn validate_route(kind: ResourceKind, state: Arc<WebhookState>) -> MethodRouter {
    post(move |Json(review): Json<AdmissionReview<DynamicObject>>| async move {
        let path = format!("/validate-{}", kind.singular());
        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(e) => {
                warn!(webhook = kind.kind_str(), error = %e, "Malformed admission review");
                state
                    .metrics
                    .admission_reviews
                    .with_label_values(&[&path, "invalid"])
                    .inc();
                return Json(AdmissionResponse::invalid(e.to_string()).into_review());
            }
        };

        let response = match validate(kind, &req) {
            Ok(()) => AdmissionResponse::from(&req),
            Err(reason) => {
                info!(
                    webhook = kind.kind_str(),
                    uid = %req.uid,
                    reason = %reason,
                    "Denying admission"
                );
                AdmissionResponse::from(&req).deny(reason)
            }
        };
        let outcome = if response.allowed { "allowed" } else { "denied" };
        state
            .metrics
            .admission_reviews
            .with_label_values(&[&path, outcome])
            .inc();
        Json(response.into_review())
    })
}

/// Validate the incoming object for the given kind
///
/// Deletion reviews carry no object and are always allowed.
fn validate(kind: ResourceKind, req: &AdmissionRequest<DynamicObject>) -> Result<(), String> {
    let Some(obj) = &req.object else {
        return Ok(());
    };

    if let Some(types) = &obj.types {
        if types.kind != kind.kind_str() {
            return Err(format!(
                "expected kind {}, got {}",
                kind.kind_str(),
                types.kind
            ));
        }
    }

    let value = serde_json::to_value(obj).map_err(|e| e.to_string())?;
    match kind {
        ResourceKind::Machine => {
            let machine: Metal3Machine = parse(value)?;
            validate_machine(&machine)
        }
        ResourceKind::Cluster => {
            let cluster: Metal3Cluster = parse(value)?;
            if cluster.spec.control_plane_endpoint.host.is_empty() {
                return Err("spec.controlPlaneEndpoint.host must be set".to_string());
            }
            Ok(())
        }
        ResourceKind::Data => {
            let data: Metal3Data = parse(value)?;
            if data.spec.template.is_empty() {
                return Err("spec.template must be set".to_string());
            }
            Ok(())
        }
        ResourceKind::DataClaim => {
            let claim: Metal3DataClaim = parse(value)?;
            if claim.spec.template.is_empty() {
                return Err("spec.template must be set".to_string());
            }
            Ok(())
        }
        ResourceKind::DataTemplate => {
            let _: Metal3DataTemplate = parse(value)?;
            Ok(())
        }
        ResourceKind::MachineTemplate => {
            let template: Metal3MachineTemplate = parse(value)?;
            validate_machine_spec_image(&template.spec.template.spec.image)
        }
        ResourceKind::Remediation => {
            let _: Metal3Remediation = parse(value)?;
            Ok(())
        }
        ResourceKind::RemediationTemplate => {
            let _: Metal3RemediationTemplate = parse(value)?;
            Ok(())
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid object: {e}"))
}

fn validate_machine(machine: &Metal3Machine) -> Result<(), String> {
    validate_machine_spec_image(&machine.spec.image)
}

fn validate_machine_spec_image(image: &metal3_common::crd::Image) -> Result<(), String> {
    if image.url.is_empty() {
        return Err("spec.image.url must be set".to_string());
    }
    if image.checksum.is_empty() {
        return Err("spec.image.checksum must be set".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::metrics::Metrics;

    use super::*;

    fn registry() -> WebhookRegistry {
        let state = Arc::new(WebhookState {
            metrics: Metrics::new().unwrap(),
        });
        WebhookRegistry::new(state)
    }

    fn review(kind: &str, spec: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "infrastructure.cluster.x-k8s.io", "version": "v1beta1", "kind": kind},
                "resource": {"group": "infrastructure.cluster.x-k8s.io", "version": "v1beta1", "resource": format!("{}s", kind.to_lowercase())},
                "operation": "CREATE",
                "userInfo": {},
                "object": {
                    "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
                    "kind": kind,
                    "metadata": {"name": "test", "namespace": "metal3"},
                    "spec": spec
                }
            }
        })
    }

    async fn post_review(
        router: Router,
        path: &str,
        body: serde_json::Value,
    ) -> serde_json::Value {
        let resp = router
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn all_kinds_register_both_routes() {
        let mut registry = registry();
        registry.register_all().unwrap();
        assert_eq!(registry.registered().len(), ALL_RESOURCE_KINDS.len());
        assert!(registry.routes.contains(&"/mutate-metal3machine".to_string()));
        assert!(registry
            .routes
            .contains(&"/validate-metal3remediationtemplate".to_string()));
    }

    #[test]
    fn duplicate_registration_fails_and_records_nothing_further() {
        let mut registry = registry();
        registry.register(ResourceKind::Machine).unwrap();
        let err = registry.register(ResourceKind::Machine).unwrap_err();
        assert!(err.to_string().contains("duplicate webhook route"));
        assert_eq!(registry.registered(), &["Metal3Machine"]);
    }

    #[tokio::test]
    async fn valid_machine_is_allowed() {
        let mut registry = registry();
        registry.register_all().unwrap();
        let router = registry.into_router();

        let body = review(
            "Metal3Machine",
            json!({"image": {"url": "http://images/ubuntu.img", "checksum": "http://images/ubuntu.md5"}}),
        );
        let out = post_review(router, "/validate-metal3machine", body).await;
        assert_eq!(out["response"]["allowed"], json!(true));
    }

    #[tokio::test]
    async fn machine_without_image_url_is_denied() {
        let mut registry = registry();
        registry.register_all().unwrap();
        let router = registry.into_router();

        let body = review(
            "Metal3Machine",
            json!({"image": {"url": "", "checksum": "abc"}}),
        );
        let out = post_review(router, "/validate-metal3machine", body).await;
        assert_eq!(out["response"]["allowed"], json!(false));
    }

    #[tokio::test]
    async fn mutate_allows_unchanged() {
        let mut registry = registry();
        registry.register_all().unwrap();
        let router = registry.into_router();

        let body = review(
            "Metal3Cluster",
            json!({"controlPlaneEndpoint": {"host": "10.0.0.1", "port": 6443}}),
        );
        let out = post_review(router, "/mutate-metal3cluster", body).await;
        assert_eq!(out["response"]["allowed"], json!(true));
    }
}
