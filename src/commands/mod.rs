pub mod cluster_info;
pub mod kubeconfig;
pub mod probe;
