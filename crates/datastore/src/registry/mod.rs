//! Datastore and instance bookkeeping

pub mod datastores;
pub mod instances;

pub use datastores::DatastoreRegistry;
pub use instances::InstanceRegistry;
