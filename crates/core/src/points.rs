//! Point values for rolls, duplicates and snipes.

use crate::character::Character;

/// Flat award for rolling (or losing a claim race on) a character someone
/// already owns.
pub const DUPLICATE_BONUS: i64 = 150;

/// Bonus for characters whose primary role is a lead role.
pub const MAIN_ROLE_BONUS: i64 = 500;

/// Minimum award on a lucky roll.
pub const LUCKY_FLOOR: i64 = 500;

/// Snipe price per favorite.
pub const SNIPE_COST_PER_FAVORITE: i64 = 3;

/// Base points from the catalog favorite count.
pub fn base_points(favorites: i64) -> i64 {
    match favorites {
        i64::MIN..=0 => 1,
        1..=9 => 2,
        10..=49 => 5,
        50..=99 => 10,
        100..=499 => 25,
        500..=999 => 50,
        1000..=4999 => 100,
        _ => 250,
    }
}

/// Full point value of a roll.
pub fn point_value(favorites: i64, is_main: bool, lucky: bool) -> i64 {
    let mut points = base_points(favorites);
    if is_main {
        points += MAIN_ROLE_BONUS;
    }
    if lucky {
        points = points.max(LUCKY_FLOOR);
    }
    points
}

/// Point value of a rolled character.
pub fn character_points(character: &Character, lucky: bool) -> i64 {
    point_value(character.favorites, character.is_main_role(), lucky)
}

/// Cost for a third party to snipe a pending claim.
pub fn snipe_cost(favorites: i64) -> i64 {
    favorites.max(0).saturating_mul(SNIPE_COST_PER_FAVORITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_boundaries() {
        assert_eq!(base_points(0), 1);
        assert_eq!(base_points(1), 2);
        assert_eq!(base_points(9), 2);
        assert_eq!(base_points(10), 5);
        assert_eq!(base_points(49), 5);
        assert_eq!(base_points(50), 10);
        assert_eq!(base_points(99), 10);
        assert_eq!(base_points(100), 25);
        assert_eq!(base_points(499), 25);
        assert_eq!(base_points(500), 50);
        assert_eq!(base_points(999), 50);
        assert_eq!(base_points(1000), 100);
        assert_eq!(base_points(4999), 100);
        assert_eq!(base_points(5000), 250);
        assert_eq!(base_points(180_000), 250);
    }

    #[test]
    fn unpopular_non_main_is_one_point() {
        assert_eq!(point_value(0, false, false), 1);
    }

    #[test]
    fn main_role_adds_bonus() {
        assert_eq!(point_value(5, true, false), 502);
    }

    #[test]
    fn lucky_floor_does_not_lower_high_values() {
        assert_eq!(point_value(5, true, true), 502);
    }

    #[test]
    fn lucky_floor_raises_low_values() {
        assert_eq!(point_value(0, false, true), 500);
    }

    #[test]
    fn snipe_cost_is_three_per_favorite() {
        assert_eq!(snipe_cost(0), 0);
        assert_eq!(snipe_cost(120), 360);
        assert_eq!(snipe_cost(-4), 0);
    }
}
