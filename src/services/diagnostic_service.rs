// src/services/diagnostic_service.rs

use std::{future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;

use crate::{
    common::error::AppError,
    db::{
        store::{HouseholdSnapshot, VisibilityRequest},
        RegistryStore,
    },
    models::{
        diagnostics::{
            CodeIntegrityReport, DriftFinding, DriftReport, DriftScanReport, FindingCode, ParityCheckRequest,
            ParityMismatch, ParityReport,
        },
        geography::GeographicCode,
        household::HouseholdCode,
        principal::Principal,
    },
    policy::{
        declarative::SessionSettings,
        model::{self, Resource},
        AccessMode, Decision, ScopeFilter,
    },
    services::geography_service::GeographyService,
};

/// Roda `future` até terminar ou até o token ser cancelado.
async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = future => result,
    }
}

fn drift_report(snapshot: HouseholdSnapshot) -> DriftReport {
    let HouseholdSnapshot { household, residents } = snapshot;
    let findings = residents
        .iter()
        .filter_map(|resident| {
            let mismatched_levels = household.attribution.mismatched_levels(&resident.attribution);
            (!mismatched_levels.is_empty()).then(|| DriftFinding {
                resident_id: resident.id,
                resident_attribution: resident.attribution.clone(),
                mismatched_levels,
                finding: FindingCode::AttributionDrift,
            })
        })
        .collect();

    DriftReport {
        household_code: household.code,
        household_attribution: household.attribution,
        residents_checked: residents.len(),
        findings,
    }
}

/// Verificações de consistência. Todas são somente leitura: relatam, nunca
/// corrigem.
#[derive(Clone)]
pub struct DiagnosticService {
    store: Arc<dyn RegistryStore>,
    geography: Arc<GeographyService>,
}

impl DiagnosticService {
    pub const MAX_PARITY_SAMPLE: usize = 1000;

    pub fn new(store: Arc<dyn RegistryStore>, geography: Arc<GeographyService>) -> Self {
        Self { store, geography }
    }

    /// Passa o mesmo conjunto de ids pelos dois caminhos (mesmo snapshot) e
    /// compara com a decisão do modelo. Qualquer divergência é crítica.
    pub async fn check_decision_parity(
        &self,
        operator: &Principal,
        request: ParityCheckRequest,
        cancel: &CancellationToken,
    ) -> Result<ParityReport, AppError> {
        if request.resource_ids.len() > Self::MAX_PARITY_SAMPLE {
            return Err(AppError::InvalidInput(format!(
                "Amostra limitada a {} ids.",
                Self::MAX_PARITY_SAMPLE
            )));
        }

        let claims = &request.principal;
        let resolved = Principal::resolve(claims, &self.geography);
        // Principal não resolvido: os dois caminhos têm que negar tudo.
        let (session, filter) = match &resolved {
            Ok(principal) => (
                SessionSettings::for_principal(principal),
                ScopeFilter::for_principal(principal, AccessMode::Read),
            ),
            Err(_) => (SessionSettings::unresolved(&claims.identity.to_string()), ScopeFilter::deny_all()),
        };
        let reference = ScopeFilter::for_principal(operator, AccessMode::Read);

        let samples = cancellable(
            cancel,
            self.store.sample_visibility(VisibilityRequest {
                kind: request.kind,
                resource_ids: &request.resource_ids,
                session: &session,
                filter: &filter,
                reference: &reference,
            }),
        )
        .await?;

        let mismatches: Vec<ParityMismatch> = samples
            .iter()
            .filter_map(|sample| {
                let model_decision = match &sample.attribution {
                    Some(attribution) => model::decide_claims(
                        claims,
                        &self.geography,
                        Resource { attribution, mutable: sample.mutable },
                    ),
                    None => Decision::Deny,
                };
                let agree = sample.declarative == sample.privileged && sample.declarative == model_decision.allows_read();
                (!agree).then(|| ParityMismatch {
                    resource_id: sample.resource_id.clone(),
                    declarative_allows: sample.declarative,
                    privileged_allows: sample.privileged,
                    model_decision,
                    finding: FindingCode::DecisionParityViolation,
                })
            })
            .collect();

        let critical = !mismatches.is_empty();
        if critical {
            tracing::error!(
                "🚨 DECISION_PARITY_VIOLATION: {} divergências para {} ({})",
                mismatches.len(),
                claims.identity,
                claims.role
            );
        } else {
            tracing::info!("Paridade ok para {} ({} ids)", claims.identity, samples.len());
        }

        Ok(ParityReport {
            identity: claims.identity,
            role: claims.role.clone(),
            principal_resolved: resolved.is_ok(),
            kind: request.kind,
            sampled: samples.len(),
            mismatches,
            critical,
        })
    }

    pub async fn check_attribution_drift(
        &self,
        operator: &Principal,
        code: &HouseholdCode,
        cancel: &CancellationToken,
    ) -> Result<DriftReport, AppError> {
        let filter = ScopeFilter::for_principal(operator, AccessMode::Read);
        let snapshot = cancellable(cancel, self.store.snapshot_household(&filter, code))
            .await?
            .ok_or_else(|| AppError::HouseholdNotFound(code.to_string()))?;

        let report = drift_report(snapshot);
        if report.has_drift() {
            tracing::warn!(
                "ATTRIBUTION_DRIFT no domicílio {}: {} residentes",
                code,
                report.findings.len()
            );
        }
        Ok(report)
    }

    /// Deriva de todos os domicílios no escopo do operador. O cancelamento é
    /// verificado entre um domicílio e outro.
    pub async fn scan_attribution_drift(
        &self,
        operator: &Principal,
        cancel: &CancellationToken,
    ) -> Result<DriftScanReport, AppError> {
        let filter = ScopeFilter::for_principal(operator, AccessMode::Read);
        let codes = cancellable(cancel, self.store.list_household_codes(&filter)).await?;

        let mut report = DriftScanReport { households_checked: 0, residents_checked: 0, drifted: Vec::new() };
        for code in codes {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Varredura de deriva cancelada após {} domicílios",
                    report.households_checked
                );
                return Err(AppError::Cancelled);
            }
            // Removido entre a listagem e a leitura: segue adiante.
            let Some(snapshot) = cancellable(cancel, self.store.snapshot_household(&filter, &code)).await? else {
                continue;
            };
            let drift = drift_report(snapshot);
            report.households_checked += 1;
            report.residents_checked += drift.residents_checked;
            if drift.has_drift() {
                report.drifted.push(drift);
            }
        }

        tracing::info!(
            "Varredura de deriva: {} domicílios, {} com deriva",
            report.households_checked,
            report.drifted.len()
        );
        Ok(report)
    }

    pub fn check_code_integrity(&self, code: &GeographicCode) -> CodeIntegrityReport {
        self.geography.check_integrity(code)
    }
}
