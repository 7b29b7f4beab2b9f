use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{
    CityReading, Entity, EntityId, PassOutcome, Reading, ReadingsResponse, RefreshStatus,
    RefreshSummary,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_readings,
        handlers::search_readings,
        handlers::get_reading,
        handlers::trigger_refresh,
        handlers::refresh_status,
    ),
    components(schemas(
        EntityId,
        Entity,
        Reading,
        CityReading,
        ReadingsResponse,
        RefreshSummary,
        PassOutcome,
        RefreshStatus,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "readings", description = "Stored weather readings"),
        (name = "admin", description = "Refresh scheduler control"),
    ),
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
