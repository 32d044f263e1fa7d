//! Catalog of supported regions, sizes, applications and predefined machines

use serde::{Deserialize, Serialize};

use crate::models::machine::{Application, InstanceSize, MachineConfiguration, Region};

/// A ready-made machine offered to users and to the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedMachine {
    pub id: String,
    pub name: String,
    pub description: String,
    pub region: Region,
    pub instance_size: InstanceSize,
    pub application: Application,
}

impl PredefinedMachine {
    /// Instantiate as a new canvas node with the given id
    pub fn to_configuration(&self, id: impl Into<String>) -> MachineConfiguration {
        MachineConfiguration::new(
            id,
            self.name.clone(),
            self.region,
            self.instance_size,
            self.application,
        )
    }
}

pub fn predefined_machines() -> Vec<PredefinedMachine> {
    vec![
        PredefinedMachine {
            id: "vscode-large-eu-west".to_string(),
            name: "VSCode Machine".to_string(),
            description: "Good for development agents".to_string(),
            region: Region::EuWest1,
            instance_size: InstanceSize::T3Large,
            application: Application::Vscode,
        },
        PredefinedMachine {
            id: "basic-micro-us-east".to_string(),
            name: "Claude machine".to_string(),
            description: "Small agent machine".to_string(),
            region: Region::UsEast1,
            instance_size: InstanceSize::T2Micro,
            application: Application::None,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub code: Region,
    pub name: String,
}

/// Everything the canvas needs to populate its pickers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub regions: Vec<RegionInfo>,
    pub instance_sizes: Vec<InstanceSize>,
    pub applications: Vec<Application>,
    pub predefined_machines: Vec<PredefinedMachine>,
}

pub fn catalog() -> Catalog {
    Catalog {
        regions: Region::ALL
            .into_iter()
            .map(|code| RegionInfo {
                code,
                name: code.display_name().to_string(),
            })
            .collect(),
        instance_sizes: InstanceSize::ALL.to_vec(),
        applications: Application::ALL.to_vec(),
        predefined_machines: predefined_machines(),
    }
}
