/// Extra key carrying the latitude of a set command, as a decimal string.
pub const EXTRA_LAT: &str = "lat";
/// Extra key carrying the longitude of a set command, as a decimal string.
pub const EXTRA_LON: &str = "lon";
/// Optional extra key carrying the altitude in meters.
pub const EXTRA_ALT: &str = "alt";

/// Reply of a get command before any location has been set.
pub const NO_LOCATION: &str = "NA";

/// Action ids understood by the command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    SetLocation,
    GetLocation,
    Stop,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::SetLocation => "mockgps.action.SET_LOCATION",
            CommandAction::GetLocation => "mockgps.action.GET_LOCATION",
            CommandAction::Stop => "mockgps.action.STOP",
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CommandAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mockgps.action.SET_LOCATION" => Ok(CommandAction::SetLocation),
            "mockgps.action.GET_LOCATION" => Ok(CommandAction::GetLocation),
            "mockgps.action.STOP" => Ok(CommandAction::Stop),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ids() {
        for action in [CommandAction::SetLocation, CommandAction::GetLocation, CommandAction::Stop] {
            assert_eq!(action.as_str().parse::<CommandAction>(), Ok(action));
        }
        assert!("mockgps.action.REBOOT".parse::<CommandAction>().is_err());
    }
}
