use crate::models::{PolarTask, SubjectKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Line(String),
    /// Extra quiescence barrier on top of the per-line idle wait.
    AwaitIdle,
}

fn line(text: impl Into<String>) -> ScriptStep {
    ScriptStep::Line(text.into())
}

/// Full interaction for one polar: load the shape, sweep the positive angles
/// into the accumulation file, reinitialise the boundary layer, then sweep the
/// negative angles.
pub fn polar_script(task: &PolarTask) -> Vec<ScriptStep> {
    let mut steps = vec![ScriptStep::AwaitIdle];

    match task.subject_kind() {
        SubjectKind::Generated { command, digits } => {
            steps.push(line(command));
            steps.push(line(digits));
        }
        SubjectKind::FileBacked => {
            steps.push(line("load"));
            steps.push(line(task.profile_file_name()));
            steps.push(line(task.profile.clone()));
        }
    }

    steps.extend([
        line("oper"),
        line("visc"),
        line(task.reynolds.clone()),
        line("mach"),
        line(format_value(task.mach)),
        line("pacc"),
        line(task.polar_file_name()),
        // No dump file.
        line(""),
        line("aseq"),
        line("0"),
        line(format_value(task.angle_max)),
        line(format_value(task.angle_step)),
        ScriptStep::AwaitIdle,
        line("vpar"),
        line("init"),
        line(""),
        line("aseq"),
        line(format_value(-task.angle_step)),
        line(format_value(-task.angle_max)),
        line(format_value(-task.angle_step)),
    ]);

    steps
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}
