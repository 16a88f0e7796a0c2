//! World configuration loading.
//!
//! Parses the JSON world file into a populated [`game::World`]. Units are
//! converted on the way in: speeds from units/second to units/millisecond,
//! retirement time and the loot generator period from seconds to
//! milliseconds. The raw `lootTypes` arrays are kept verbatim per map so the
//! maps API can echo them back unchanged.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use game::{
    Building, LootGeneratorConfig, Map, Office, Offset, Point, Road, Size, World,
};

const DEFAULT_DOG_SPEED: f64 = 1.0;
const DEFAULT_BAG_CAPACITY: usize = 3;
const DEFAULT_RETIREMENT_TIME_S: f64 = 60.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map {0}: roads must not be empty")]
    NoRoads(String),
    #[error("map {map}: road {index} must set either x1 or y1")]
    BadRoad { map: String, index: usize },
    #[error("map {0}: lootTypes must not be empty")]
    NoLootTypes(String),
    #[error("map {map}: lootTypes[{index}] is missing an integer value")]
    MissingLootValue { map: String, index: usize },
    #[error(transparent)]
    Map(#[from] game::MapError),
    #[error(transparent)]
    World(#[from] game::WorldError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorldFile {
    default_dog_speed: Option<f64>,
    default_bag_capacity: Option<usize>,
    dog_retirement_time: Option<f64>,
    loot_generator_config: LootGeneratorFile,
    maps: Vec<MapFile>,
}

#[derive(Debug, Deserialize)]
struct LootGeneratorFile {
    /// Seconds.
    period: f64,
    probability: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapFile {
    id: String,
    name: String,
    #[serde(default)]
    roads: Vec<RoadFile>,
    #[serde(default)]
    buildings: Vec<BuildingFile>,
    #[serde(default)]
    offices: Vec<OfficeFile>,
    loot_types: Vec<serde_json::Value>,
    dog_speed: Option<f64>,
    bag_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RoadFile {
    x0: i32,
    y0: i32,
    x1: Option<i32>,
    y1: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BuildingFile {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfficeFile {
    id: String,
    x: i32,
    y: i32,
    offset_x: i32,
    offset_y: i32,
}

/// A world plus the raw loot-type JSON for the maps API.
pub struct LoadedGame {
    pub world: World,
    pub loot_catalog: HashMap<String, serde_json::Value>,
}

pub fn load_game(path: &Path) -> Result<LoadedGame, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_game(&text)
}

pub fn parse_game(text: &str) -> Result<LoadedGame, ConfigError> {
    let file: WorldFile = serde_json::from_str(text)?;
    build_world(file)
}

fn build_world(file: WorldFile) -> Result<LoadedGame, ConfigError> {
    let mut world = World::new(LootGeneratorConfig {
        period_ms: file.loot_generator_config.period * 1000.0,
        probability: file.loot_generator_config.probability,
    });
    let mut loot_catalog = HashMap::new();

    let default_speed = file.default_dog_speed.unwrap_or(DEFAULT_DOG_SPEED);
    let default_capacity = file.default_bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY);
    let retirement_ms =
        file.dog_retirement_time.unwrap_or(DEFAULT_RETIREMENT_TIME_S) * 1000.0;

    for map_file in file.maps {
        let map = build_map(&map_file, default_speed, default_capacity, retirement_ms)?;
        loot_catalog.insert(
            map_file.id.clone(),
            serde_json::Value::Array(map_file.loot_types),
        );
        world.add_map(map)?;
    }

    Ok(LoadedGame { world, loot_catalog })
}

fn build_map(
    file: &MapFile,
    default_speed: f64,
    default_capacity: usize,
    retirement_ms: f64,
) -> Result<Map, ConfigError> {
    if file.roads.is_empty() {
        return Err(ConfigError::NoRoads(file.id.clone()));
    }
    if file.loot_types.is_empty() {
        return Err(ConfigError::NoLootTypes(file.id.clone()));
    }

    let mut map = Map::new(file.id.clone(), file.name.clone());
    map.set_speed(file.dog_speed.unwrap_or(default_speed) / 1000.0);
    map.set_bag_capacity(file.bag_capacity.unwrap_or(default_capacity));
    map.set_idle_limit_ms(retirement_ms);

    for (index, road) in file.roads.iter().enumerate() {
        let start = Point { x: road.x0, y: road.y0 };
        if let Some(x1) = road.x1 {
            map.add_road(Road::horizontal(start, x1));
        } else if let Some(y1) = road.y1 {
            map.add_road(Road::vertical(start, y1));
        } else {
            return Err(ConfigError::BadRoad { map: file.id.clone(), index });
        }
    }

    for building in &file.buildings {
        map.add_building(Building {
            position: Point { x: building.x, y: building.y },
            size: Size { width: building.w, height: building.h },
        });
    }

    for office in &file.offices {
        map.add_office(Office {
            id: office.id.clone(),
            position: Point { x: office.x, y: office.y },
            offset: Offset { dx: office.offset_x, dy: office.offset_y },
        })?;
    }

    let mut values = Vec::with_capacity(file.loot_types.len());
    for (index, loot_type) in file.loot_types.iter().enumerate() {
        let value = loot_type
            .get("value")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ConfigError::MissingLootValue { map: file.id.clone(), index })?;
        values.push(value as i32);
    }
    map.set_loot_values(values);

    Ok(map)
}
