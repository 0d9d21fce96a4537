/*!
    Timestamp type for media timing.
*/

use crate::Rational;

/**
    Presentation timestamp in time_base units.

    This is the raw timestamp value from the media stream. Decoders convert
    it to milliseconds at their boundary; no raw stream-base timestamp is
    exposed outside a stage.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Convert this PTS to milliseconds using the given time base.

        `pts_ms = pts * num * 1000 / den`, computed in 128-bit to avoid
        overflow for large RTP timestamps. Negative values clamp to zero.
    */
    #[inline]
    pub fn to_millis(self, time_base: Rational) -> i64 {
        if self.0 <= 0 {
            return 0;
        }
        let scaled = self.0 as i128 * time_base.num as i128 * 1000 / time_base.den as i128;
        scaled as i64
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Pts> for i64 {
    fn from(pts: Pts) -> Self {
        pts.0
    }
}
