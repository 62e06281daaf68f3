use std::fmt;
use std::str::FromStr;

use crate::error::ActuatorError;

/// One of the two pump+valve air channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelId {
    /// Inflation channel.
    One,
    /// Deflation channel.
    Two,
}

impl ChannelId {
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = ActuatorError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ActuatorError::InvalidChannel(other)),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Requested output state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    On,
    Off,
}

impl Action {
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for Action {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl FromStr for Action {
    type Err = ActuatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("on") {
            Ok(Self::On)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(Self::Off)
        } else {
            Err(ActuatorError::InvalidAction(s.to_string()))
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_channels_one_and_two_exist() {
        assert_eq!(ChannelId::try_from(1), Ok(ChannelId::One));
        assert_eq!(ChannelId::try_from(2), Ok(ChannelId::Two));
        assert_eq!(ChannelId::try_from(0), Err(ActuatorError::InvalidChannel(0)));
        assert_eq!(ChannelId::try_from(3), Err(ActuatorError::InvalidChannel(3)));
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("ON".parse::<Action>(), Ok(Action::On));
        assert_eq!("off".parse::<Action>(), Ok(Action::Off));
        assert!("toggle".parse::<Action>().is_err());
    }
}
