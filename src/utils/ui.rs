use crate::core::models::{BuildMode, OutputFile};
use colored::*;
use std::path::Path;
use std::time::Instant;

/// Console summary printed after a finished build.
pub struct BuildSummary {
    start_time: Instant,
}

impl BuildSummary {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn show_banner(&self, pipeline: &str, mode: BuildMode) {
        println!(
            "\n  {} {} {}",
            "ASSETFLOW".bright_cyan().bold(),
            pipeline.bright_white(),
            format!("({})", mode).bright_black()
        );
        println!();
    }

    pub fn show_completion(&self, outdir: &Path, files: &[OutputFile]) {
        let build_time = self.start_time.elapsed();
        let prefix = format!("{}/", outdir.file_name().unwrap_or_default().to_string_lossy());

        println!();
        for file in files {
            let name = file.path.strip_prefix(outdir).unwrap_or(&file.path);
            println!(
                "  {} {} {}",
                prefix.bright_black(),
                name.display().to_string().bright_cyan(),
                format!("({})", format_size(file.size)).bright_black()
            );
        }

        println!();
        println!(
            "  {} {} file(s) built in {}",
            "✓".bright_green(),
            files.len(),
            format!("{:.0}ms", build_time.as_secs_f64() * 1000.0)
                .bright_white()
                .bold()
        );
    }
}

impl Default for BuildSummary {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_size(size: u64) -> String {
    let size_kb = size as f64 / 1024.0;
    if size_kb < 1.0 {
        format!("{} B", size)
    } else if size_kb < 1024.0 {
        format!("{:.2} kB", size_kb)
    } else {
        format!("{:.2} MB", size_kb / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_pick_a_readable_unit() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 kB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
