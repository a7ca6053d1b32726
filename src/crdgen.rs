use controller::api::{Cluster, ClusterCredential};
use kube::CustomResourceExt;

fn main() {
    let mut out = String::new();
    out.push_str(&serde_yaml::to_string(&Cluster::crd()).unwrap());
    out.push_str("---\n");
    out.push_str(&serde_yaml::to_string(&ClusterCredential::crd()).unwrap());
    print!("{out}");
}
