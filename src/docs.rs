// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::policy;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Access ---
        handlers::access::decide,

        // --- Households ---
        handlers::households::create_household,
        handlers::households::get_household,
        handlers::households::update_household,
        handlers::households::relocate_household,

        // --- Residents ---
        handlers::residents::create_resident,
        handlers::residents::list_residents,
        handlers::residents::get_resident,
        handlers::residents::move_resident,
        handlers::residents::deactivate_resident,

        // --- Reports ---
        handlers::reports::resident_report,
        handlers::reports::barangay_summary,
        handlers::reports::bulk_deactivate,

        // --- Diagnostics ---
        handlers::diagnostics::check_parity,
        handlers::diagnostics::check_drift,
        handlers::diagnostics::scan_drift,
        handlers::diagnostics::check_code,
        handlers::diagnostics::repair,
    ),
    components(
        schemas(
            // --- Policy ---
            policy::Decision,
            policy::ResourceKind,
            handlers::access::DecisionRequest,
            handlers::access::DecisionResponse,

            // --- Geography ---
            models::geography::GeoLevel,
            models::geography::GeoUnit,
            models::geography::Attribution,
            models::principal::AccessLevel,
            models::principal::PrincipalClaims,

            // --- Households ---
            models::household::Household,
            models::household::HouseholdDetails,
            models::household::CreateHouseholdPayload,
            models::household::RelocateHouseholdPayload,
            models::household::Relocation,

            // --- Residents ---
            models::resident::Resident,
            models::resident::PersonalDetails,
            models::resident::NewHouseholdForResident,
            models::resident::CreateResidentPayload,
            models::resident::MoveResidentPayload,
            services::propagation_service::CreatedResident,

            // --- Reports ---
            models::report::ResidentReportRow,
            models::report::BarangaySummaryRow,
            models::report::BulkDeactivatePayload,
            models::report::BulkDeactivateResponse,

            // --- Diagnostics ---
            models::diagnostics::FindingCode,
            models::diagnostics::ChainGap,
            models::diagnostics::CodeIntegrityReport,
            models::diagnostics::ParityCheckRequest,
            models::diagnostics::ParityMismatch,
            models::diagnostics::ParityReport,
            models::diagnostics::DriftFinding,
            models::diagnostics::DriftReport,
            models::diagnostics::DriftScanReport,
            models::diagnostics::AttributionRepair,
        )
    ),
    tags(
        (name = "Access", description = "Decisão de acesso por jurisdição geográfica"),
        (name = "Households", description = "Domicílios (fonte da atribuição geográfica)"),
        (name = "Residents", description = "Residentes (códigos herdados do domicílio)"),
        (name = "Reports", description = "Relatórios e operações em lote do caminho privilegiado"),
        (name = "Diagnostics", description = "Paridade de decisões, deriva de atribuição e integridade de códigos")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
