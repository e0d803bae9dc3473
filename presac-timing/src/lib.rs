mod timer;

pub use timer::{
    CalibrationStats, FrameRateError, HighPrecisionTimer, Timer, check_refresh_rate,
};
