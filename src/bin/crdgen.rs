//! Print the SiteManager CRD as YAML

use kube::CustomResourceExt;
use site_manager_operator::crd::SiteManager;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&SiteManager::crd())?);
    Ok(())
}
