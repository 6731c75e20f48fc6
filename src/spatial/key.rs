use glam::{I64Vec3, Vec3};

use crate::settings::SpatialSettings;

// -------------------------------------------------------------------------------------------------

/// Integer identifier of a fixed size, cubic spatial cell.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(pub i64);

// -------------------------------------------------------------------------------------------------

/// Maps 3D positions to [`CellKey`]s.
///
/// A key is `x + y * y_multiplier + z * z_multiplier`, where x, y and z are the per axis cell
/// indices `floor(position / cell_size)`. Keys of different cells only are unique as long as all
/// cell indices stay within the key space's envelope, see [`contains_cell`](Self::contains_cell).
/// Positions outside of the envelope alias with other cells: callers must keep their entities
/// within it.
///
/// The default multipliers give each axis 21 bits, which allows cell indices in
/// `-2^20..2^20` on all axes. The multipliers `1000` and `10000`, which only allow x indices in
/// `-500..500` and y indices in `-5..5`, can be used via [`with_multipliers`](Self::with_multipliers)
/// to stay compatible with existing keys.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CellKeySpace {
    cell_size: f32,
    y_multiplier: i64,
    z_multiplier: i64,
}

impl Default for CellKeySpace {
    fn default() -> Self {
        Self::new(SpatialSettings::CELL_SIZE.default_value())
    }
}

impl CellKeySpace {
    /// Default y axis multiplier.
    pub const Y_MULTIPLIER: i64 = 1 << 21;
    /// Default z axis multiplier.
    pub const Z_MULTIPLIER: i64 = 1 << 42;

    /// Create a new key space with the given cell size and default multipliers.
    /// The cell size gets clamped into the valid cell size range.
    pub fn new(cell_size: f32) -> Self {
        Self::with_multipliers(cell_size, Self::Y_MULTIPLIER, Self::Z_MULTIPLIER)
    }

    /// Create a new key space with custom axis multipliers.
    ///
    /// Multipliers get clamped so that `1 <= y_multiplier <= z_multiplier`.
    pub fn with_multipliers(cell_size: f32, y_multiplier: i64, z_multiplier: i64) -> Self {
        let y_multiplier = y_multiplier.max(1);
        let z_multiplier = z_multiplier.max(y_multiplier);
        Self {
            cell_size: SpatialSettings::CELL_SIZE.clamp_value(cell_size),
            y_multiplier,
            z_multiplier,
        }
    }

    /// Edge length of a cell in world units.
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn y_multiplier(&self) -> i64 {
        self.y_multiplier
    }

    pub fn z_multiplier(&self) -> i64 {
        self.z_multiplier
    }

    /// Per axis cell index of the given position.
    pub fn cell_of(&self, position: Vec3) -> I64Vec3 {
        let cell_size = self.cell_size as f64;
        let index = |value: f32| (value as f64 / cell_size).floor() as i64;
        I64Vec3::new(index(position.x), index(position.y), index(position.z))
    }

    /// Key of the cell with the given per axis index.
    pub fn key_of_cell(&self, cell: I64Vec3) -> CellKey {
        CellKey(
            cell.x
                .wrapping_add(cell.y.wrapping_mul(self.y_multiplier))
                .wrapping_add(cell.z.wrapping_mul(self.z_multiplier)),
        )
    }

    /// Key of the cell the given position lies in.
    pub fn key_of(&self, position: Vec3) -> CellKey {
        self.key_of_cell(self.cell_of(position))
    }

    /// True when the given cell index lies within the envelope of unique keys.
    pub fn contains_cell(&self, cell: I64Vec3) -> bool {
        let x_extent = self.y_multiplier / 2;
        let y_extent = (self.z_multiplier / self.y_multiplier) / 2;
        let z_extent = i64::MAX / self.z_multiplier / 2 + 1;
        (-x_extent..x_extent).contains(&cell.x)
            && (-y_extent..y_extent).contains(&cell.y)
            && (-z_extent..z_extent).contains(&cell.z)
    }

    /// True when the given position lies within the envelope of unique keys.
    pub fn contains(&self, position: Vec3) -> bool {
        self.contains_cell(self.cell_of(position))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_cell() {
        let keys = CellKeySpace::new(5.0);
        let key = keys.key_of(Vec3::new(0.5, 1.0, 2.0));
        assert_eq!(keys.key_of(Vec3::new(4.9, 4.9, 4.9)), key);
        assert_eq!(keys.key_of(Vec3::ZERO), key);
        assert_eq!(
            keys.key_of(Vec3::new(-3.0, 7.0, 12.0)),
            keys.key_of(Vec3::new(-0.5, 9.9, 10.0))
        );
    }

    #[test]
    fn adjacent_cells() {
        for keys in [
            CellKeySpace::new(5.0),
            CellKeySpace::with_multipliers(5.0, 1000, 10000),
        ] {
            let position = Vec3::new(1.0, 1.0, 1.0);
            let key = keys.key_of(position);
            for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                assert_ne!(keys.key_of(position + axis * 5.0), key);
                assert_ne!(keys.key_of(position - axis * 5.0), key);
            }
            // negative positions floor towards negative infinity
            assert_ne!(keys.key_of(Vec3::new(-0.1, 1.0, 1.0)), key);
        }
    }

    #[test]
    fn envelope() {
        let keys = CellKeySpace::new(1.0);
        let max = (1 << 20) - 1;
        let min = -(1 << 20);
        assert!(keys.contains_cell(I64Vec3::new(max, min, max)));
        assert!(!keys.contains_cell(I64Vec3::new(max + 1, 0, 0)));
        assert!(!keys.contains_cell(I64Vec3::new(0, min - 1, 0)));
        // distinct keys within the envelope
        assert_ne!(
            keys.key_of_cell(I64Vec3::new(max, 0, 0)),
            keys.key_of_cell(I64Vec3::new(min, 1, 0))
        );
        assert_ne!(
            keys.key_of_cell(I64Vec3::new(0, max, 0)),
            keys.key_of_cell(I64Vec3::new(0, min, 1))
        );

        let legacy = CellKeySpace::with_multipliers(1.0, 1000, 10000);
        assert!(legacy.contains_cell(I64Vec3::new(499, 4, 100)));
        assert!(!legacy.contains_cell(I64Vec3::new(500, 0, 0)));
        assert!(!legacy.contains_cell(I64Vec3::new(0, 5, 0)));
    }

    #[test]
    fn cell_size_is_clamped() {
        assert!(CellKeySpace::new(0.0).cell_size() > 0.0);
        assert!(CellKeySpace::new(-1.0).cell_size() > 0.0);
        assert_eq!(CellKeySpace::default().cell_size(), 5.0);
    }
}
