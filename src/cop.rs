/// Readings at or beyond this magnitude on either axis are board glitches.
pub const COP_LIMIT: f64 = 20.0;

/// Centre of pressure reported by the balance board, in board units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopPoint {
    pub x: f64,
    pub y: f64,
}

impl CopPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Parse a telemetry line of the form `(x, y)`.
    ///
    /// Anything else the board prints (banners, raw cell weights, acks) yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let inner = line.trim().strip_prefix('(')?.strip_suffix(')')?;
        let (x, y) = inner.split_once(',')?;
        let x = x.trim().parse::<f64>().ok()?;
        let y = y.trim().parse::<f64>().ok()?;

        if x.is_finite() && y.is_finite() {
            Some(Self { x, y })
        } else {
            None
        }
    }

    pub fn is_plausible(&self) -> bool {
        self.x.abs() < COP_LIMIT && self.y.abs() < COP_LIMIT
    }
}
