//! Route registry and the dispatch walk.
//!
//! # Responsibilities
//! - Store installed routes in registration order
//! - Walk a request through them until a handler finishes it
//! - Report the outcome to the application
//!
//! # Design Decisions
//! - Append-only; populated before traffic, read-only afterwards
//! - Pure registration order, no specificity ranking
//! - No local recovery: the first failure ends the walk

use tracing::trace;

use crate::error::Error;
use crate::http::context::RouteContext;
use crate::routing::route::{ParamMappers, Route};

/// How a dispatch walk ended.
#[derive(Debug)]
pub enum Dispatch {
    /// The route at this index returned `true`.
    Handled(usize),
    /// Every route was tried and none finished the request.
    Unhandled,
    /// A matcher, mapper or handler failed.
    Failed(Error),
}

/// Ordered collection of routes.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Its position is its dispatch priority.
    pub fn install(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Walk the routes starting at `start`.
    pub fn dispatch_from(
        &self,
        ctx: &mut RouteContext,
        start: usize,
        mappers: &ParamMappers,
    ) -> Dispatch {
        for (index, route) in self.routes.iter().enumerate().skip(start) {
            let params = match route.matches(&ctx.req, &mut ctx.res, mappers) {
                Ok(Some(params)) => params,
                Ok(None) => continue,
                Err(e) => return Dispatch::Failed(e),
            };

            trace!(
                index,
                method = route.method(),
                pattern = route.pattern().spec(),
                "Route matched"
            );
            ctx.req.merge_params(params);
            ctx.req.set_route_index(index);

            match (route.handler())(ctx) {
                Ok(true) => return Dispatch::Handled(index),
                Ok(false) => continue,
                Err(e) => return Dispatch::Failed(e),
            }
        }
        Dispatch::Unhandled
    }
}
