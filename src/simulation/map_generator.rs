//! Randomized topology and demand generation
//!
//! Builds a grid of intersections with sites hanging off its border. All
//! randomness comes from the caller's generator, so a seeded generator gives
//! the same map every time.

use anyhow::Result;
use log::info;
use rand::Rng;

use super::types::{NodeId, Position};
use super::world::SimWorld;

/// Shape of a generated map
#[derive(Debug, Clone, PartialEq)]
pub struct MapProfile {
    pub rows: usize,
    pub cols: usize,
    /// Distance between neighbouring intersections in meters
    pub spacing: f64,
    /// Chance that a border intersection gets a site attached
    pub site_probability: f64,
    pub min_speed_limit: f64,
    pub max_speed_limit: f64,
    /// Chance that a site pair carries demand
    pub demand_probability: f64,
}

impl Default for MapProfile {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            spacing: 200.0,
            site_probability: 0.5,
            min_speed_limit: 10.0,
            max_speed_limit: 25.0,
            demand_probability: 1.0,
        }
    }
}

/// Populate an empty world with a random grid map and demand
///
/// The two opposite corners always get a site, so at least one demand pair
/// exists whenever `demand_probability` is positive.
pub fn generate_map<R: Rng + ?Sized>(
    world: &mut SimWorld,
    profile: &MapProfile,
    rng: &mut R,
) -> Result<Vec<NodeId>> {
    if profile.rows == 0 || profile.cols == 0 {
        anyhow::bail!("Map needs at least one row and one column");
    }
    if profile.min_speed_limit <= 0.0 || profile.max_speed_limit < profile.min_speed_limit {
        anyhow::bail!(
            "Invalid speed limit range {}..{}",
            profile.min_speed_limit,
            profile.max_speed_limit
        );
    }

    let mut grid = Vec::with_capacity(profile.rows);
    for row in 0..profile.rows {
        let mut line = Vec::with_capacity(profile.cols);
        for col in 0..profile.cols {
            let position = Position::new(col as f64 * profile.spacing, row as f64 * profile.spacing);
            line.push(world.add_cross_node(&format!("cross_{}_{}", row, col), position)?);
        }
        grid.push(line);
    }

    // Connect grid horizontally and vertically
    for row in 0..profile.rows {
        for col in 0..profile.cols {
            if col + 1 < profile.cols {
                let limit = random_speed_limit(profile, rng);
                world.add_two_way_edge(grid[row][col], grid[row][col + 1], limit, 0)?;
            }
            if row + 1 < profile.rows {
                let limit = random_speed_limit(profile, rng);
                world.add_two_way_edge(grid[row][col], grid[row + 1][col], limit, 0)?;
            }
        }
    }

    let last_row = profile.rows - 1;
    let last_col = profile.cols - 1;
    let mut sites = Vec::new();
    for row in 0..profile.rows {
        for col in 0..profile.cols {
            let on_border = row == 0 || col == 0 || row == last_row || col == last_col;
            if !on_border {
                continue;
            }
            let corner = (row == 0 && col == 0) || (row == last_row && col == last_col);
            if !corner && !rng.random_bool(profile.site_probability.clamp(0.0, 1.0)) {
                continue;
            }

            // Push the site outwards from the grid
            let mut dx = 0.0;
            let mut dy = 0.0;
            if col == 0 {
                dx -= 1.0;
            } else if col == last_col {
                dx += 1.0;
            }
            if row == 0 {
                dy -= 1.0;
            } else if row == last_row {
                dy += 1.0;
            }
            let offset = profile.spacing / 2.0;
            let position = Position::new(
                col as f64 * profile.spacing + dx * offset,
                row as f64 * profile.spacing + dy * offset,
            );

            let site = world.add_site(&format!("site_{}_{}", row, col), position)?;
            let limit = random_speed_limit(profile, rng);
            world.add_two_way_edge(site, grid[row][col], limit, 1)?;
            sites.push(site);
        }
    }

    for &departure in &sites {
        for &destination in &sites {
            if departure == destination {
                continue;
            }
            if rng.random_bool(profile.demand_probability.clamp(0.0, 1.0)) {
                let weight: f64 = rng.random_range(0.1..1.0);
                world.set_demand(departure, destination, weight)?;
            }
        }
    }

    info!(
        "Generated {}x{} map with {} sites and {} demand entries",
        profile.rows,
        profile.cols,
        sites.len(),
        world.generator.demand().len()
    );
    Ok(sites)
}

fn random_speed_limit<R: Rng + ?Sized>(profile: &MapProfile, rng: &mut R) -> f64 {
    if profile.max_speed_limit > profile.min_speed_limit {
        rng.random_range(profile.min_speed_limit..profile.max_speed_limit)
    } else {
        profile.min_speed_limit
    }
}
