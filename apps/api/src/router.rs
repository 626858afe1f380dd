use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use token_allocation_cell::{create_token_allocation_router, TokenAllocationState};

pub fn create_router(state: Arc<TokenAllocationState>) -> Router {
    Router::new()
        .route("/", get(|| async { "OPD Token Allocation API is running!" }))
        .nest("/api/v1", create_token_allocation_router(state))
}
