//! Static reachability analysis over relationship-based access-control schemas.
//!
//! Given a subject type and a resource relation, [`reachability::ReachabilityGraph`]
//! computes every entrypoint through which subjects of that type can influence the
//! resource relation, without reading any relationship data.

pub mod reachability;
pub mod schema;
pub mod typesystem;
