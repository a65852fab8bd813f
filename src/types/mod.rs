use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²). All G-force values are expressed as multiples of this.
pub const GRAVITY: f64 = 9.81;

/// Three-axis sensor vector in the device frame.
///
/// Axis convention: x = lateral (right positive), y = longitudinal
/// (forward positive), z = vertical (up positive).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axis3 {
    pub const ZERO: Axis3 = Axis3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<Vector3<f64>> for Axis3 {
    fn from(v: Vector3<f64>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl std::ops::Sub for Axis3 {
    type Output = Axis3;

    fn sub(self, rhs: Axis3) -> Axis3 {
        Axis3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// One hardware sample: accelerometer (m/s²) and gyroscope (rad/s).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
    pub accel: Axis3,
    pub gyro: Axis3,
}

impl RawSample {
    pub fn new(timestamp_ms: u64, accel: Axis3, gyro: Axis3) -> Self {
        Self {
            timestamp_ms,
            accel,
            gyro,
        }
    }

    /// A level, motionless sample: gravity on z, no rotation.
    pub fn stationary(timestamp_ms: u64) -> Self {
        Self::new(timestamp_ms, Axis3::new(0.0, 0.0, GRAVITY), Axis3::ZERO)
    }
}

/// Fused output for a single calibrated sample. Never mutated after creation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedReading {
    pub timestamp_ms: u64,
    /// Calibrated accelerometer vector (m/s², device frame).
    pub accel: Axis3,
    /// Calibrated gyroscope vector (rad/s, device frame).
    pub gyro: Axis3,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    /// Gravity-compensated vertical acceleration (m/s²).
    pub filtered_accel_z: f64,
    pub peak_lateral_g: f64,
    pub peak_longitudinal_g: f64,
    pub peak_vertical_g: f64,
    /// Vehicle speed at fusion time (m/s), supplied externally.
    pub speed: f64,
}

impl FusedReading {
    /// Total acceleration magnitude of the calibrated accel vector, in G.
    pub fn total_g(&self) -> f64 {
        self.accel.magnitude() / GRAVITY
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }
}
