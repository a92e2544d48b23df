//! Conversion of worker-reported endpoints into storable rows.

use std::collections::HashSet;

use autodoc_db::models::endpoint::CreateEndpoint;
use autodoc_scanner::DetectedEndpoint;
use serde_json::json;

/// Normalise one detected endpoint. Returns `None` when the worker sent a
/// route without a path or method.
///
/// Methods are upper-cased; absent structured fields default to empty JSON;
/// blank file paths and non-positive line numbers read as unknown.
pub fn to_create_endpoint(detected: DetectedEndpoint) -> Option<CreateEndpoint> {
    let path = detected.path.trim().to_string();
    let method = detected.method.trim().to_ascii_uppercase();
    if path.is_empty() || method.is_empty() {
        return None;
    }

    Some(CreateEndpoint {
        path,
        method,
        summary: detected.summary.unwrap_or_default(),
        description: detected.description.unwrap_or_default(),
        tags: detected.tags.unwrap_or_default(),
        parameters: detected
            .parameters
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| json!([])),
        responses: detected
            .responses
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| json!({})),
        auth_required: detected.auth_required.unwrap_or(false),
        file_path: detected.file_path.filter(|p| !p.trim().is_empty()),
        line_number: detected.line_number.filter(|n| *n > 0),
        code_snippet: detected.code_snippet.filter(|s| !s.is_empty()),
    })
}

/// Normalise a whole result set, dropping malformed routes and keeping the
/// first occurrence of each `(path, method)` pair.
pub fn to_create_endpoints(detected: Vec<DetectedEndpoint>) -> Vec<CreateEndpoint> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(detected.len());

    for item in detected {
        let Some(endpoint) = to_create_endpoint(item) else {
            tracing::warn!("Dropping detected endpoint without path or method");
            continue;
        };
        if seen.insert((endpoint.path.clone(), endpoint.method.clone())) {
            endpoints.push(endpoint);
        }
    }
    endpoints
}
