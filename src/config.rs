use quadscape_map::TerrainConfig;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Names the dataset in the tile cache. Terrains sharing a cache need distinct labels.
    pub label: String,
    pub terrain: TerrainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label: "terrain".to_owned(),
            terrain: TerrainConfig::default(),
        }
    }
}

impl Config {
    pub fn read_file(path: &str) -> Result<Self, ron::Error> {
        let reader = std::fs::File::open(path)?;

        ron::de::from_reader(reader)
    }
}
