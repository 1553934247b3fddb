/// 扫描会话状态
///
/// `Idle → Detecting → RegionsReady → Extracting → Idle` 循环，共识达成后进入 `Stopped`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Detecting { ticket: u64 },
    RegionsReady { generation: u64 },
    Extracting { generation: u64 },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    FrameArrived,
    /// `stored` 是应用检测结果后区域仓库中的 generation
    DetectionFinished { ticket: u64, stored: Option<u64> },
    ExtractionFinished { confirmed: bool },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    RequestDetection(u64),
    Extract(u64),
    DropFrame,
    ClearRegions,
    Continue,
    Halt,
    Ignore,
}

impl ScanState {
    pub fn new() -> Self {
        ScanState::Idle
    }

    pub fn transition(&self, event: ScanEvent, next_ticket: u64) -> (ScanState, ScanAction) {
        match (*self, event) {
            (ScanState::Stopped, _) => (ScanState::Stopped, ScanAction::Ignore),
            (_, ScanEvent::Stop) => (ScanState::Stopped, ScanAction::Halt),

            (ScanState::Idle, ScanEvent::FrameArrived) => (
                ScanState::Detecting {
                    ticket: next_ticket,
                },
                ScanAction::RequestDetection(next_ticket),
            ),
            (ScanState::RegionsReady { generation }, ScanEvent::FrameArrived) => (
                ScanState::Extracting { generation },
                ScanAction::Extract(generation),
            ),
            (ScanState::Detecting { .. } | ScanState::Extracting { .. }, ScanEvent::FrameArrived) => {
                (*self, ScanAction::DropFrame)
            }

            (ScanState::Detecting { ticket }, ScanEvent::DetectionFinished { ticket: done, stored })
                if ticket == done =>
            {
                match stored {
                    Some(generation) => (ScanState::RegionsReady { generation }, ScanAction::Continue),
                    None => (ScanState::Idle, ScanAction::Continue),
                }
            }
            (_, ScanEvent::DetectionFinished { .. }) => (*self, ScanAction::Ignore),

            (ScanState::Extracting { .. }, ScanEvent::ExtractionFinished { confirmed: true }) => {
                (ScanState::Stopped, ScanAction::Halt)
            }
            (ScanState::Extracting { .. }, ScanEvent::ExtractionFinished { confirmed: false }) => {
                (ScanState::Idle, ScanAction::ClearRegions)
            }
            (_, ScanEvent::ExtractionFinished { .. }) => (*self, ScanAction::Ignore),
        }
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StateMachine {
    state: ScanState,
    next_ticket: u64,
    frame_counter: u64,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ScanState::new(),
            next_ticket: 1,
            frame_counter: 0,
        }
    }

    pub fn process(&mut self, event: ScanEvent) -> ScanAction {
        if event == ScanEvent::FrameArrived {
            self.frame_counter += 1;
        }

        let (new_state, action) = self.state.transition(event, self.next_ticket);
        if let ScanAction::RequestDetection(_) = action {
            self.next_ticket += 1;
        }
        self.state = new_state;

        action
    }

    pub fn current_state(&self) -> &ScanState {
        &self.state
    }

    /// Ticket of the detection currently in flight.
    pub fn awaiting(&self) -> Option<u64> {
        match self.state {
            ScanState::Detecting { ticket } => Some(ticket),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ScanState::Stopped
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn reset(&mut self) {
        self.state = ScanState::new();
        self.frame_counter = 0;
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
