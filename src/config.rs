use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about = "Kubernetes initializer that prepares pods for VFIO device passthrough", version)]
pub struct Cli {
    #[arg(
        long,
        env = "VFIO_INITIALIZER_NAME",
        help = "Initializer name this controller claims in a pod's pending list, e.g. vfio.initializer.kubevirt.io"
    )]
    pub initializer_name: String,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to a kubeconfig file; defaults to in-cluster or ~/.kube/config resolution"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        help = "Namespace to watch for uninitialized pods, defaults to all namespaces"
    )]
    pub namespace: Option<String>,
}
