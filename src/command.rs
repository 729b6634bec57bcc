/// One playback control action accepted by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Next,
    Prev,
    Toggle,
}

impl PlayerCommand {
    /// Parse a control token. Unknown tokens are a client mistake, reported
    /// as a failed command rather than an error, so this returns `None`
    /// instead of failing.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            "toggle" => Some(Self::Toggle),
            _ => None,
        }
    }
}
