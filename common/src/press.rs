use serde::{Deserialize, Serialize};

use crate::command::WindowCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseCommand {
    Open,
    Close,
}

impl BaseCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            _ => None,
        }
    }

    pub fn automatic(self) -> WindowCommand {
        match self {
            Self::Open => WindowCommand::Open,
            Self::Close => WindowCommand::Close,
        }
    }

    pub fn manual(self) -> WindowCommand {
        match self {
            Self::Open => WindowCommand::ManualOpen,
            Self::Close => WindowCommand::ManualClose,
        }
    }
}

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    Start(BaseCommand),
    TimerFired(SessionId),
    Release,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEffect {
    ArmTimer { session: SessionId, after_ms: u64 },
    CancelTimer(SessionId),
    Send(WindowCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PressPhase {
    Idle,
    Pressing,
    LongPressFired,
}

#[derive(Debug, Clone, Copy)]
struct PressSession {
    id: SessionId,
    command: BaseCommand,
    start_ms: u64,
    timer_armed: bool,
    long_press_fired: bool,
}

/// Turns press/release/cancel on one control into at most one command per
/// session. The host owns the real timer and feeds `TimerFired` back in.
#[derive(Debug, Clone)]
pub struct PressHoldController {
    long_press_ms: u64,
    session: Option<PressSession>,
    next_session: SessionId,
}

impl PressHoldController {
    pub fn new(long_press_ms: u64) -> Self {
        Self {
            long_press_ms,
            session: None,
            next_session: 1,
        }
    }

    pub fn long_press_ms(&self) -> u64 {
        self.long_press_ms
    }

    pub fn phase(&self) -> PressPhase {
        match self.session {
            None => PressPhase::Idle,
            Some(session) if session.long_press_fired => PressPhase::LongPressFired,
            Some(_) => PressPhase::Pressing,
        }
    }

    pub fn held_ms(&self, now_ms: u64) -> Option<u64> {
        self.session
            .map(|session| now_ms.saturating_sub(session.start_ms))
    }

    pub fn handle(&mut self, event: PressEvent, now_ms: u64) -> Vec<PressEffect> {
        match event {
            PressEvent::Start(command) => self.press_start(command, now_ms),
            PressEvent::TimerFired(id) => self.timer_fired(id),
            PressEvent::Release => self.release(now_ms),
            PressEvent::Cancel => self.cancel(),
        }
    }

    pub fn press_start(&mut self, command: BaseCommand, now_ms: u64) -> Vec<PressEffect> {
        let mut effects = Vec::new();

        match self.session {
            Some(session) if !session.long_press_fired => return effects,
            // A fired session is already resolved; a new press replaces it.
            Some(session) => self.disarm(session, &mut effects),
            None => {}
        }

        let id = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        self.session = Some(PressSession {
            id,
            command,
            start_ms: now_ms,
            timer_armed: true,
            long_press_fired: false,
        });
        effects.push(PressEffect::ArmTimer {
            session: id,
            after_ms: self.long_press_ms,
        });
        effects
    }

    pub fn timer_fired(&mut self, id: SessionId) -> Vec<PressEffect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.id != id || session.long_press_fired {
            return Vec::new();
        }

        session.timer_armed = false;
        session.long_press_fired = true;
        vec![PressEffect::Send(session.command.automatic())]
    }

    pub fn release(&mut self, now_ms: u64) -> Vec<PressEffect> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };

        let mut effects = Vec::new();
        self.disarm(session, &mut effects);

        if session.long_press_fired {
            return effects;
        }

        // The timer may still be queued behind this release; elapsed time decides.
        let held_ms = now_ms.saturating_sub(session.start_ms);
        let command = if held_ms >= self.long_press_ms {
            session.command.automatic()
        } else {
            session.command.manual()
        };
        effects.push(PressEffect::Send(command));
        effects
    }

    pub fn cancel(&mut self) -> Vec<PressEffect> {
        let mut effects = Vec::new();
        if let Some(session) = self.session.take() {
            self.disarm(session, &mut effects);
        }
        effects
    }

    fn disarm(&self, session: PressSession, effects: &mut Vec<PressEffect>) {
        if session.timer_armed {
            effects.push(PressEffect::CancelTimer(session.id));
        }
    }
}

impl Default for PressHoldController {
    fn default() -> Self {
        Self::new(crate::protocol::DEFAULT_LONG_PRESS_MS)
    }
}
