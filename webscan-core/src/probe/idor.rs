use super::similarity::{marker_count, ratio_off_thread};
use super::{Detector, ProbeContext, ProbeError, with_param_value};
use crate::finding::{Finding, Severity, VulnKind};
use async_trait::async_trait;
use tracing::debug;
use url::Url;
use webscan_scanner::fetch::FetchRequest;
use webscan_scanner::result::Page;

/// `id`, `uid`, `user_id`, `userId` and similar.
pub fn is_id_like(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "id" || lower == "uid" || lower.ends_with("_id") || (name.len() > 2 && name.ends_with("Id"))
}

/// Parameter-mutation heuristic for insecure direct object references.
///
/// For every numeric id-like query parameter the page URL is requested as a baseline
/// and again with a few substitute ids. A 200 response that differs clearly from the
/// baseline, or that shows more records than it, is reported. This favours recall:
/// pages with rotating or time-dependent content will produce false positives.
pub struct IdorDetector;

#[async_trait]
impl Detector for IdorDetector {
    fn name(&self) -> &'static str {
        "idor"
    }

    async fn detect(&self, page: &Page, ctx: &ProbeContext) -> Result<Vec<Finding>, ProbeError> {
        let url = Url::parse(&page.url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        let tuning = &ctx.target.tuning;

        let candidates: Vec<(usize, String, String)> = url
            .query_pairs()
            .into_owned()
            .enumerate()
            .filter(|(_, (name, value))| {
                is_id_like(name) && !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
            })
            .map(|(index, (name, value))| (index, name, value))
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let baseline = ctx.fetch(FetchRequest::get(url.clone())).await?;
        let baseline_markers = marker_count(&baseline.body, &tuning.idor_marker);

        for (index, name, original) in candidates {
            for substitute in tuning.idor_mutations.iter().filter(|s| **s != original) {
                let mutated_url = with_param_value(&url, index, substitute);
                let response = match ctx.fetch(FetchRequest::get(mutated_url.clone())).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("IDOR request {} failed: {}", mutated_url, e);
                        continue;
                    }
                };

                // an explicit denial is the correct behaviour
                if response.status_code != 200 {
                    continue;
                }

                let markers = marker_count(&response.body, &tuning.idor_marker);
                let similarity = ratio_off_thread(baseline.body.clone(), response.body).await?;
                let differs = similarity < tuning.idor_similarity_threshold;
                let more_records = markers > baseline_markers;

                if differs || more_records {
                    let evidence = format!(
                        "{}={} returned 200 with similarity {:.2} to {}={} (threshold {:.2}), '{}' count {} vs {}",
                        name,
                        substitute,
                        similarity,
                        name,
                        original,
                        tuning.idor_similarity_threshold,
                        tuning.idor_marker,
                        markers,
                        baseline_markers
                    );
                    return Ok(vec![
                        Finding::new(
                            VulnKind::AccessControl,
                            &page.url,
                            Severity::High,
                            "Possible insecure direct object reference",
                            evidence,
                        )
                        .with_payload(mutated_url.to_string()),
                    ]);
                }
            }
        }

        Ok(Vec::new())
    }
}
