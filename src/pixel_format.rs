use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Channel names in the order frames store them
const CHANNEL_NAMES: [char; 4] = ['R', 'G', 'B', 'W'];

/// Order in which a pixel's channels go out on the wire.
///
/// `indices()[i]` is the stored channel sent in position `i`, so GRB is
/// `[1, 0, 2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOrder {
    indices: Vec<usize>,
}

impl ChannelOrder {
    pub fn from_indices(indices: Vec<usize>) -> Result<Self> {
        if indices.is_empty() {
            return Err(Error::invalid_config("channel order is empty"));
        }

        let mut seen = vec![false; indices.len()];
        for &index in &indices {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(Error::invalid_config(format!(
                        "channel order {:?} is not a permutation",
                        indices
                    )))
                }
            }
        }

        Ok(ChannelOrder { indices })
    }

    /// Identity order for `channels` channels
    pub fn identity(channels: usize) -> Result<Self> {
        Self::from_indices((0..channels).collect())
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Channels per pixel this order applies to
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Channels of `pixel` in wire order
    #[inline]
    pub fn apply<'a>(&'a self, pixel: &'a [u8]) -> impl Iterator<Item = u8> + 'a {
        self.indices.iter().map(move |&i| pixel[i])
    }
}

impl FromStr for ChannelOrder {
    type Err = Error;

    /// Parse a name such as "RGB", "GRB", "BGR" or "GRBW"
    fn from_str(s: &str) -> Result<Self> {
        let indices = s
            .trim()
            .chars()
            .map(|c| {
                CHANNEL_NAMES
                    .iter()
                    .position(|&name| name == c.to_ascii_uppercase())
                    .ok_or_else(|| {
                        Error::invalid_config(format!("unknown channel '{}' in order {:?}", c, s))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_indices(indices)
            .map_err(|_| Error::invalid_config(format!("channel order {:?} is not a permutation", s)))
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &index in &self.indices {
            write!(f, "{}", CHANNEL_NAMES.get(index).copied().unwrap_or('?'))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(order: &str, pixel: &[u8]) -> Vec<u8> {
        let order: ChannelOrder = order.parse().unwrap();
        order.apply(pixel).collect()
    }

    #[test]
    fn test_rgb_passthrough() {
        assert_eq!(wire("RGB", &[255, 0, 0]), vec![255, 0, 0]);
    }

    #[test]
    fn test_grb_order() {
        assert_eq!(wire("GRB", &[255, 0, 0]), vec![0, 255, 0]);
    }

    #[test]
    fn test_bgr_order() {
        assert_eq!(wire("BGR", &[255, 0, 0]), vec![0, 0, 255]);
    }

    #[test]
    fn test_grbw_order() {
        // white stays its own channel, nothing is derived from RGB
        assert_eq!(wire("GRBW", &[10, 20, 30, 40]), vec![20, 10, 30, 40]);
        assert_eq!(wire("grbw", &[10, 20, 30, 40]), vec![20, 10, 30, 40]);
    }

    #[test]
    fn test_invalid_orders() {
        assert!("".parse::<ChannelOrder>().is_err());
        assert!("RGX".parse::<ChannelOrder>().is_err());
        assert!("RRB".parse::<ChannelOrder>().is_err());
        // skips G, so not a permutation of 0..3
        assert!("RBW".parse::<ChannelOrder>().is_err());
        assert!(ChannelOrder::from_indices(vec![0, 3, 1]).is_err());
    }

    #[test]
    fn test_display() {
        let order: ChannelOrder = "grb".parse().unwrap();
        assert_eq!(order.to_string(), "GRB");
        assert_eq!(ChannelOrder::identity(4).unwrap().to_string(), "RGBW");
    }
}
