//! Verified-metrics enrichment for emitted artifacts.
//!
//! After generation, RPC records of providers enrolled in the SLA
//! monitoring program can be annotated with measured uptime and latency:
//!
//! 1. Each network's verified-provider roster is fetched from the toolbox
//!    API (`https://<network>.<domain>/toolbox/api/verified-providers`).
//! 2. SLA metrics for the roster's service ids are fetched from the
//!    monitoring subgraph in one GraphQL batch per network.
//! 3. Records are patched in place: `verifiedUptime` (basis points),
//!    `verifiedLatency`, `verifiedBlocksBehindAvg`.
//!
//! Failure rules, chosen to never destroy data on a flaky upstream:
//! - roster fetch failed: skip the network, keep the file as-is.
//! - roster empty (valid state): null out all verified fields.
//! - subgraph fetch failed: keep existing verified fields untouched.
//! - provider missing from the roster: no longer verified, fields nulled.
//! - provider in roster but absent from subgraph data: no data yet, keep.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{EnrichError, PipelineError, PipelineResult};

/// Categories whose records carry verified metrics.
const VERIFIED_CATEGORIES: &[&str] = &["rpc"];

/// Basis-point denominator for uptime math.
const BPS_DENOMINATOR: i64 = 10_000;

const VERIFIED_FIELDS: &[&str] = &["verifiedUptime", "verifiedLatency", "verifiedBlocksBehindAvg"];

const SLA_QUERY: &str = r#"
query ($serviceIds: [String!]!) {
  serviceHealthMetrics(where: { id_in: $serviceIds }) {
    id
    totalProofs
    downtimeCount
    latencyCount
    blockLatencyAvg
    timeLatencyAvg
    consensusExecutions
    violations
  }
}
"#;

/// One verified-provider roster entry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VerifiedProvider {
    pub slug: String,
    #[serde(rename = "serviceId")]
    pub service_id: String,
}

/// Client for the verified-providers API and the SLA monitoring subgraph.
pub struct VerifiedClient {
    http: reqwest::Client,
    api_token: String,
    subgraph_url: String,
    graph_api_key: String,
    api_domain: String,
}

impl VerifiedClient {
    /// Build a client from the environment. All three credentials are
    /// required; the API domain can be overridden for testing.
    pub fn from_env() -> Result<Self, EnrichError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http: reqwest::Client::new(),
            api_token: require_env("VERIFIED_API_TOKEN")?,
            subgraph_url: require_env("SLA_MONITORING_SUBGRAPH_URL")?,
            graph_api_key: require_env("GRAPH_API_KEY")?,
            api_domain: env::var("CHAINDEX_VERIFIED_API_DOMAIN")
                .unwrap_or_else(|_| "chain.love".to_string()),
        })
    }

    /// Fetch the verified-provider roster for one network.
    ///
    /// An empty vector is a valid "nobody verified" state, distinct from a
    /// failed request.
    pub async fn fetch_verified_providers(
        &self,
        network: &str,
    ) -> Result<Vec<VerifiedProvider>, EnrichError> {
        let url = format!(
            "https://{}.{}/toolbox/api/verified-providers",
            network, self.api_domain
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EnrichError::InvalidResponse(e.to_string()))?;

        // Either a bare array or an object with `providers`.
        let entries = match &payload {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => map
                .get("providers")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .ok_or_else(|| {
                    EnrichError::InvalidResponse("verified-providers has no 'providers' array".into())
                })?,
            _ => {
                return Err(EnrichError::InvalidResponse(
                    "verified-providers response has unexpected shape".into(),
                ))
            }
        };

        let mut roster = Vec::new();
        for entry in entries {
            if let Ok(provider) = serde_json::from_value::<VerifiedProvider>(entry.clone()) {
                if !provider.slug.is_empty() && !provider.service_id.is_empty() {
                    roster.push(provider);
                }
            }
        }
        Ok(roster)
    }

    /// Fetch SLA metrics for a set of service ids in one GraphQL batch.
    /// Returns a mapping from service id to its raw metrics object.
    pub async fn fetch_sla_metrics(
        &self,
        service_ids: &[String],
    ) -> Result<HashMap<String, Value>, EnrichError> {
        if service_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut seen = HashMap::new();
        let unique: Vec<&String> = service_ids
            .iter()
            .filter(|id| seen.insert(id.as_str(), ()).is_none())
            .collect();

        let response = self
            .http
            .post(&self.subgraph_url)
            .bearer_auth(&self.graph_api_key)
            .timeout(Duration::from_secs(20))
            .json(&json!({ "query": SLA_QUERY, "variables": { "serviceIds": unique } }))
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EnrichError::InvalidResponse(e.to_string()))?;

        if let Some(errors) = payload.get("errors") {
            return Err(EnrichError::InvalidResponse(format!(
                "subgraph returned errors: {}",
                errors
            )));
        }

        let metrics = payload
            .get("data")
            .and_then(|d| d.get("serviceHealthMetrics"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                EnrichError::InvalidResponse("subgraph response has unexpected shape".into())
            })?;

        let mut by_id = HashMap::new();
        for metric in metrics {
            // Keep only services with actual observations.
            let total_proofs = to_int(metric.get("totalProofs"));
            let consensus = to_int(metric.get("consensusExecutions"));
            if total_proofs <= 0 && consensus <= 0 {
                continue;
            }
            if let Some(id) = metric.get("id").and_then(Value::as_str) {
                by_id.insert(id.to_string(), metric.clone());
            }
        }
        Ok(by_id)
    }

    /// Enrich every `<network>.json` artifact in `dir` in place.
    pub async fn enrich_artifacts(&self, dir: &Path) -> PipelineResult<()> {
        if !dir.is_dir() {
            log::warn!("no '{}' directory found, nothing to enrich", dir.display());
            return Ok(());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| PipelineError::io(dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(network) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
            else {
                continue;
            };

            let original: Value = match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str(&c).map_err(|e| e.to_string()))
            {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("[{}] cannot read artifact: {}", network, e);
                    continue;
                }
            };

            let roster = match self.fetch_verified_providers(&network).await {
                Ok(roster) => roster,
                Err(e) => {
                    // Upstream down: preserve the file untouched.
                    log::warn!("[{}] failed to fetch verified providers: {}", network, e);
                    continue;
                }
            };

            let sla = if roster.is_empty() {
                None
            } else {
                let ids: Vec<String> = roster.iter().map(|p| p.service_id.clone()).collect();
                match self.fetch_sla_metrics(&ids).await {
                    Ok(metrics) => Some(metrics),
                    Err(e) => {
                        log::warn!("[{}] SLA subgraph request failed: {}", network, e);
                        None
                    }
                }
            };

            let enriched = enrich_network_data(&original, &roster, sla.as_ref());
            if enriched != original {
                let content = format!(
                    "{}\n",
                    serde_json::to_string_pretty(&enriched).expect("artifact is valid JSON")
                );
                std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
                log::info!("[{}] artifact updated with verified metrics", network);
            }
        }
        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, EnrichError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(EnrichError::MissingEnv(name.to_string())),
    }
}

// =============================================================================
// Pure enrichment logic
// =============================================================================

/// Normalized verified metrics for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedMetrics {
    /// Uptime in basis points (0..=10000).
    pub uptime: i64,
    pub latency: Option<String>,
    pub blocks_behind_avg: Option<String>,
}

fn to_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn to_metric_string(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Turn one raw subgraph metrics object into record fields.
///
/// Downtime is computed in basis points with pure integer math; proof-based
/// and consensus-based downtime are averaged when both exist.
pub fn normalize_metrics(metric: &Value) -> VerifiedMetrics {
    let total_proofs = to_int(metric.get("totalProofs"));
    let downtime_count = to_int(metric.get("downtimeCount"));
    let latency_count = to_int(metric.get("latencyCount"));
    let consensus_exec = to_int(metric.get("consensusExecutions"));
    let violations = to_int(metric.get("violations"));

    let proof_downtime_bps = if total_proofs > 0 {
        let total_events = (downtime_count + latency_count).max(0);
        total_events * BPS_DENOMINATOR / total_proofs
    } else {
        0
    };

    let consensus_downtime_bps = if consensus_exec > 0 {
        violations * BPS_DENOMINATOR / consensus_exec
    } else {
        0
    };

    let downtime_bps = if proof_downtime_bps != 0 && consensus_downtime_bps != 0 {
        (proof_downtime_bps + consensus_downtime_bps) / 2
    } else if proof_downtime_bps != 0 {
        proof_downtime_bps
    } else {
        consensus_downtime_bps
    };
    let downtime_bps = downtime_bps.clamp(0, BPS_DENOMINATOR);

    let block_latency_avg = metric.get("blockLatencyAvg");
    let time_latency_avg = metric.get("timeLatencyAvg");

    // Prefer wall-clock latency; fall back to block latency when it was
    // actually observed.
    let latency = match to_metric_string(time_latency_avg) {
        Some(value) => Some(value),
        None if latency_count > 0 => to_metric_string(block_latency_avg),
        None => None,
    };

    VerifiedMetrics {
        uptime: BPS_DENOMINATOR - downtime_bps,
        latency,
        blocks_behind_avg: to_metric_string(block_latency_avg),
    }
}

/// Apply the enrichment rules to one artifact. Pure: returns the patched
/// copy, leaving the input untouched.
pub fn enrich_network_data(
    data: &Value,
    roster: &[VerifiedProvider],
    sla: Option<&HashMap<String, Value>>,
) -> Value {
    let mut enriched = data.clone();

    // Nobody verified: explicitly null every verified field.
    if roster.is_empty() {
        for category in VERIFIED_CATEGORIES {
            if let Some(items) = enriched.get_mut(*category).and_then(Value::as_array_mut) {
                for item in items.iter_mut().filter_map(Value::as_object_mut) {
                    for field in VERIFIED_FIELDS {
                        item.insert((*field).to_string(), Value::Null);
                    }
                }
            }
        }
        return enriched;
    }

    // Roster known but metrics unavailable: change nothing.
    let Some(sla) = sla else {
        return enriched;
    };

    let service_ids: HashMap<&str, &str> = roster
        .iter()
        .map(|p| (p.slug.as_str(), p.service_id.as_str()))
        .collect();

    for category in VERIFIED_CATEGORIES {
        let Some(items) = enriched.get_mut(*category).and_then(Value::as_array_mut) else {
            continue;
        };
        for item in items.iter_mut().filter_map(Value::as_object_mut) {
            let Some(slug) = item.get("provider").and_then(Value::as_str).map(String::from)
            else {
                continue;
            };

            match service_ids.get(slug.as_str()) {
                Some(service_id) => match sla.get(*service_id) {
                    Some(metric) => {
                        let normalized = normalize_metrics(metric);
                        item.insert("verifiedUptime".into(), json!(normalized.uptime));
                        item.insert("verifiedLatency".into(), json!(normalized.latency));
                        item.insert(
                            "verifiedBlocksBehindAvg".into(),
                            json!(normalized.blocks_behind_avg),
                        );
                    }
                    // Verified but no observations yet: keep what is there.
                    None => continue,
                },
                // No longer verified.
                None => {
                    for field in VERIFIED_FIELDS {
                        item.insert((*field).to_string(), Value::Null);
                    }
                }
            }
        }
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(entries: &[(&str, &str)]) -> Vec<VerifiedProvider> {
        entries
            .iter()
            .map(|(slug, id)| VerifiedProvider {
                slug: slug.to_string(),
                service_id: id.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_normalize_metrics_proof_based() {
        let metric = json!({
            "totalProofs": 1000,
            "downtimeCount": 5,
            "latencyCount": 5,
            "consensusExecutions": 0,
            "violations": 0,
            "blockLatencyAvg": 2,
            "timeLatencyAvg": "350"
        });
        let normalized = normalize_metrics(&metric);
        // 10 events over 1000 proofs = 100 bps downtime.
        assert_eq!(normalized.uptime, 9900);
        assert_eq!(normalized.latency.as_deref(), Some("350"));
        assert_eq!(normalized.blocks_behind_avg.as_deref(), Some("2"));
    }

    #[test]
    fn test_normalize_metrics_averages_both_sources() {
        let metric = json!({
            "totalProofs": 100,
            "downtimeCount": 10,
            "latencyCount": 0,
            "consensusExecutions": 100,
            "violations": 30
        });
        let normalized = normalize_metrics(&metric);
        // proof: 1000 bps, consensus: 3000 bps, averaged: 2000 bps.
        assert_eq!(normalized.uptime, 8000);
    }

    #[test]
    fn test_normalize_metrics_clamps_downtime() {
        let metric = json!({
            "totalProofs": 1,
            "downtimeCount": 50,
            "latencyCount": 0
        });
        let normalized = normalize_metrics(&metric);
        assert_eq!(normalized.uptime, 0);
    }

    #[test]
    fn test_normalize_metrics_no_observations() {
        let normalized = normalize_metrics(&json!({}));
        assert_eq!(normalized.uptime, BPS_DENOMINATOR);
        assert_eq!(normalized.latency, None);
        assert_eq!(normalized.blocks_behind_avg, None);
    }

    #[test]
    fn test_block_latency_fallback_requires_observations() {
        let with_count = json!({ "latencyCount": 3, "blockLatencyAvg": 4 });
        assert_eq!(normalize_metrics(&with_count).latency.as_deref(), Some("4"));

        let without_count = json!({ "latencyCount": 0, "blockLatencyAvg": 4 });
        assert_eq!(normalize_metrics(&without_count).latency, None);
    }

    #[test]
    fn test_empty_roster_nulls_verified_fields() {
        let data = json!({
            "rpc": [{ "provider": "alchemy", "name": "Free", "verifiedUptime": 9900 }],
            "wallet": [{ "provider": "alchemy", "name": "Wallet", "verifiedUptime": 1 }]
        });
        let enriched = enrich_network_data(&data, &[], None);
        assert_eq!(enriched["rpc"][0]["verifiedUptime"], Value::Null);
        assert_eq!(enriched["rpc"][0]["verifiedLatency"], Value::Null);
        // Only verified categories are touched.
        assert_eq!(enriched["wallet"][0]["verifiedUptime"], json!(1));
    }

    #[test]
    fn test_sla_failure_preserves_existing_fields() {
        let data = json!({
            "rpc": [{ "provider": "alchemy", "name": "Free", "verifiedUptime": 9900 }]
        });
        let enriched = enrich_network_data(&data, &roster(&[("alchemy", "svc-1")]), None);
        assert_eq!(enriched, data);
    }

    #[test]
    fn test_verified_provider_gets_metrics() {
        let data = json!({
            "rpc": [{ "provider": "alchemy", "name": "Free" }]
        });
        let mut sla = HashMap::new();
        sla.insert(
            "svc-1".to_string(),
            json!({ "totalProofs": 100, "downtimeCount": 1, "latencyCount": 0 }),
        );
        let enriched = enrich_network_data(&data, &roster(&[("alchemy", "svc-1")]), Some(&sla));
        assert_eq!(enriched["rpc"][0]["verifiedUptime"], json!(9900));
    }

    #[test]
    fn test_no_longer_verified_provider_is_nulled() {
        let data = json!({
            "rpc": [
                { "provider": "alchemy", "name": "Free", "verifiedUptime": 9900 },
                { "provider": "infura", "name": "Core", "verifiedUptime": 9800 }
            ]
        });
        // The subgraph answered, but has no record for alchemy's service id.
        let mut sla = HashMap::new();
        sla.insert("svc-other".to_string(), json!({ "totalProofs": 100 }));
        let enriched = enrich_network_data(&data, &roster(&[("alchemy", "svc-1")]), Some(&sla));
        // alchemy is verified but has no fresh data: untouched.
        assert_eq!(enriched["rpc"][0]["verifiedUptime"], json!(9900));
        // infura fell off the roster: nulled.
        assert_eq!(enriched["rpc"][1]["verifiedUptime"], Value::Null);
    }
}
