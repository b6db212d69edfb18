//! Operators for manual calibration.

use std::io::{BufRead, Write};

use hand_hardware::SimHandle;
use hand_traits::{ManualRequest, Operator, Pose};

type AckResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Prompts on a writer and waits for Enter on a reader.
pub struct PromptOperator<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptOperator<std::io::StdinLock<'static>, std::io::Stderr> {
    /// Reads stdin, prompts on stderr so stdout stays machine-readable.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

fn pose_word(pose: Pose) -> &'static str {
    match pose {
        Pose::Flexed => "fully flexed",
        Pose::Extended => "fully extended",
    }
}

impl<R: BufRead, W: Write> Operator for PromptOperator<R, W> {
    fn acknowledge(&mut self, request: &ManualRequest<'_>) -> AckResult {
        write!(
            self.output,
            "[step {}/{}] Hold joint '{}' (motor {}) {} and press Enter... ",
            request.step,
            request.steps,
            request.joint,
            request.motor,
            pose_word(request.pose)
        )?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err("input closed before the pose was acknowledged".into());
        }
        writeln!(self.output)?;
        Ok(())
    }
}

/// Moves the simulated motor into the requested pose, then defers to the
/// wrapped operator for the acknowledgment.
pub struct SimulatedOperator<O> {
    sim: SimHandle,
    inner: O,
}

impl<O: Operator> SimulatedOperator<O> {
    pub fn new(sim: SimHandle, inner: O) -> Self {
        Self { sim, inner }
    }
}

impl<O: Operator> Operator for SimulatedOperator<O> {
    fn acknowledge(&mut self, request: &ManualRequest<'_>) -> AckResult {
        self.sim.backdrive_to(request.motor, request.pose);
        self.inner.acknowledge(request)
    }
}
