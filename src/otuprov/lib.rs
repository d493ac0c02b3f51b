pub mod cluster;
pub mod derep_map;
pub mod derep_run;
pub mod keys;
pub mod metadata;
pub mod provenance;
pub mod relabel;
