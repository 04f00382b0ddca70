use log::{info, warn};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("plot command is empty")]
    EmptyCommand,
    #[error("failed to launch plot command '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("plot command '{program}' failed with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("plot command '{program}' finished but did not create '{path}'")]
    MissingOutput { program: String, path: String },
}

/// Renders the visualization written to `vis_data_path` into `plot_path`.
pub trait Plotter: Send + Sync {
    fn plot_from_tsv(&self, vis_data_path: &Path, plot_path: &Path) -> Result<(), PlotError>;
}

/// Runs an external renderer as `<program> [args...] <vis_data_path> <plot_path>`.
#[derive(Debug, Clone)]
pub struct CommandPlotter {
    program: String,
    args: Vec<String>,
}

impl CommandPlotter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace. Quoting is not supported.
    pub fn from_command_line(command: &str) -> Result<Self, PlotError> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().ok_or(PlotError::EmptyCommand)?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl Plotter for CommandPlotter {
    fn plot_from_tsv(&self, vis_data_path: &Path, plot_path: &Path) -> Result<(), PlotError> {
        info!("Plotting {} with '{}'", vis_data_path.display(), self.program);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(vis_data_path)
            .arg(plot_path)
            .output()
            .map_err(|source| PlotError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PlotError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !plot_path.exists() {
            return Err(PlotError::MissingOutput {
                program: self.program.clone(),
                path: plot_path.display().to_string(),
            });
        }

        info!("Saved plot to: {}", plot_path.display());
        Ok(())
    }
}

/// Used when no renderer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipPlotter;

impl Plotter for SkipPlotter {
    fn plot_from_tsv(&self, vis_data_path: &Path, plot_path: &Path) -> Result<(), PlotError> {
        warn!(
            "No plot command configured; skipping {} (visualization data is in {})",
            plot_path.display(),
            vis_data_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn command_line_is_split_on_whitespace() {
        let plotter = CommandPlotter::from_command_line("  Rscript  cuppa_vis.R --width 10 ").unwrap();
        assert_eq!(plotter.program, "Rscript");
        assert_eq!(plotter.args, vec!["cuppa_vis.R", "--width", "10"]);
        assert!(matches!(
            CommandPlotter::from_command_line("   "),
            Err(PlotError::EmptyCommand)
        ));
    }

    #[test]
    fn skip_plotter_writes_nothing() {
        let dir = tempdir().unwrap();
        let plot = dir.path().join("cuppa.vis.png");
        SkipPlotter
            .plot_from_tsv(&dir.path().join("cuppa.vis_data.tsv"), &plot)
            .unwrap();
        assert!(!plot.exists());
    }

    #[cfg(unix)]
    #[test]
    fn renderer_receives_input_and_output_paths() {
        let dir = tempdir().unwrap();
        let vis = dir.path().join("cuppa.vis_data.tsv");
        let plot = dir.path().join("cuppa.vis.png");
        std::fs::write(&vis, "sample_id\n").unwrap();

        CommandPlotter::new("cp", Vec::new()).plot_from_tsv(&vis, &plot).unwrap();
        assert_eq!(std::fs::read_to_string(&plot).unwrap(), "sample_id\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_renderer_is_an_error() {
        let dir = tempdir().unwrap();
        let result = CommandPlotter::new("false", Vec::new())
            .plot_from_tsv(&dir.path().join("a.tsv"), &dir.path().join("a.png"));
        assert!(matches!(result, Err(PlotError::Failed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn renderer_that_writes_nothing_is_an_error() {
        let dir = tempdir().unwrap();
        let result = CommandPlotter::new("true", Vec::new())
            .plot_from_tsv(&dir.path().join("a.tsv"), &dir.path().join("a.png"));
        assert!(matches!(result, Err(PlotError::MissingOutput { .. })));
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let dir = tempdir().unwrap();
        let result = CommandPlotter::new("cuppa-no-such-renderer", Vec::new())
            .plot_from_tsv(&dir.path().join("a.tsv"), &dir.path().join("a.png"));
        assert!(matches!(result, Err(PlotError::Launch { .. })));
    }
}
