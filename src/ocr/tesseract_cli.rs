// Tesseract command line backend

use super::{OcrBackend, OcrFragment, script::{self, Script}, tsv};
use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};
use std::{
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

/// Runs the `tesseract` executable for every call, feeding the image on stdin
pub struct TesseractCliBackend {
    name: String,
    program: PathBuf,
    scripts: Vec<Script>,
    languages: String,
    psm: u32,
    tessdata_dir: Option<String>,
    /// Process of the call in flight, so `cancel` can kill it
    running: Mutex<Option<Arc<Mutex<Child>>>>,
}

impl TesseractCliBackend {
    /// Checks once that the executable runs and that every language pack
    /// this backend needs is installed.
    pub fn new(
        name: &str,
        program: &Path,
        scripts: &[Script],
        psm: u32,
        tessdata_dir: Option<&str>,
    ) -> Result<Self> {
        if scripts.is_empty() {
            anyhow::bail!("OCR backend '{}' has no scripts configured", name);
        }

        let installed = list_languages(program, tessdata_dir)?;
        let missing = scripts
            .iter()
            .map(|s| s.tesseract_lang())
            .filter(|lang| !installed.iter().any(|l| l == lang))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            anyhow::bail!(
                "tesseract language data missing for backend '{}': {}",
                name,
                missing.join(", ")
            );
        }

        let languages = script::tesseract_languages(scripts);
        info!("OCR backend '{}' ready (tesseract -l {})", name, languages);

        Ok(Self {
            name: name.to_string(),
            program: program.to_path_buf(),
            scripts: scripts.to_vec(),
            languages,
            psm,
            tessdata_dir: tessdata_dir.map(str::to_string),
            running: Mutex::new(None),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd
    }

    fn running(&self) -> MutexGuard<'_, Option<Arc<Mutex<Child>>>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OcrBackend for TesseractCliBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, img: &DynamicImage) -> Result<Vec<OcrFragment>> {
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode image for tesseract")?;

        let mut child = self
            .command()
            .arg("-")
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {} (is it installed?)", self.program.display()))?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let child = Arc::new(Mutex::new(child));
        *self.running() = Some(Arc::clone(&child));

        let result = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => {
                communicate(&child, stdin, stdout, stderr, &png)
            }
            _ => Err(anyhow!("tesseract pipes unavailable")),
        };

        {
            let mut running = self.running();
            if running.as_ref().is_some_and(|c| Arc::ptr_eq(c, &child)) {
                *running = None;
            }
        }

        let (status, stdout, stderr) = match result {
            Ok(output) => output,
            Err(e) => {
                // Do not leave the process behind on a broken pipe
                let mut child = lock_child(&child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(anyhow!("tesseract {}: {}", status, stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let fragments = tsv::parse_fragments(&stdout, &self.scripts);
        debug!(
            "tesseract -l {} returned {} fragments",
            self.languages,
            fragments.len()
        );
        Ok(fragments)
    }

    fn cancel(&self) {
        let Some(child) = self.running().clone() else {
            return;
        };
        let mut child = lock_child(&child);
        match child.kill() {
            Ok(()) => warn!(
                "Killed tesseract process {} of OCR backend '{}'",
                child.id(),
                self.name
            ),
            Err(e) => debug!("Could not kill tesseract process {}: {}", child.id(), e),
        }
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Send the image, collect both output streams and reap the process.
///
/// The child lock is only taken for the final `wait`, after stdout closed,
/// so `cancel` can reach the process while it is still working.
fn communicate(
    child: &Mutex<Child>,
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    png: &[u8],
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    // Tesseract reads the whole image before it writes anything
    stdin
        .write_all(png)
        .context("failed to send image to tesseract")?;
    drop(stdin);

    let mut output = Vec::new();
    stdout
        .read_to_end(&mut output)
        .context("failed to read tesseract output")?;

    let status = lock_child(child)
        .wait()
        .context("failed to wait for tesseract")?;
    let errors = stderr_reader.join().unwrap_or_default();
    Ok((status, output, errors))
}

/// Language packs installed for tesseract
pub fn list_languages(program: &Path, tessdata_dir: Option<&str>) -> Result<Vec<String>> {
    let mut cmd = Command::new(program);
    if let Some(dir) = tessdata_dir {
        cmd.arg("--tessdata-dir").arg(dir);
    }
    let output = cmd
        .arg("--list-langs")
        .output()
        .with_context(|| {
            format!(
                "failed to run {} --list-langs (is it installed?)",
                program.display()
            )
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }

    // Older releases print the list on stderr
    let listing = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    Ok(parse_language_list(&listing))
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_listing() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nhin\ntel\n\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "hin", "tel"]);
    }

    #[test]
    fn empty_listing_has_no_languages() {
        assert!(parse_language_list("").is_empty());
    }

    #[test]
    fn backend_needs_scripts() {
        let err = TesseractCliBackend::new("primary", Path::new("tesseract"), &[], 3, None)
            .err()
            .expect("empty script list must be rejected");
        assert!(err.to_string().contains("no scripts"));
    }

    /// Shell script standing in for the tesseract executable. It answers
    /// `--list-langs` with `langs` and runs `body` for recognition calls.
    #[cfg(unix)]
    fn fake_tesseract(dir: &Path, langs: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tesseract");
        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "--list-langs" ]; then
  printf 'List of available languages in "/fake/":\n{langs}\n'
  exit 0
fi
{body}
"#
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    const ALL_LANGS: &str = r"eng\nhin\ntel";

    #[cfg(unix)]
    #[test]
    fn recognize_pipes_png_and_parses_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(
            dir.path(),
            ALL_LANGS,
            r#"dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/args.txt"
cat > "$dir/stdin.bin"
printf 'level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n'
printf '5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t91\tBreaking\n'
printf '5\t1\t1\t1\t1\t2\t70\t10\t40\t20\t89\tnews\n'"#,
        );
        let backend =
            TesseractCliBackend::new("primary", &program, &[Script::Telugu, Script::Latin], 6, None)
                .unwrap();

        let fragments = backend.recognize(&DynamicImage::new_rgb8(16, 16)).unwrap();

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "Breaking news");
        assert_eq!(fragments[0].script, "en");

        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(
            args.lines().collect::<Vec<_>>(),
            vec!["-", "stdout", "-l", "tel+eng", "--psm", "6", "tsv"]
        );
        let stdin = std::fs::read(dir.path().join("stdin.bin")).unwrap();
        assert!(stdin.starts_with(b"\x89PNG"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(
            dir.path(),
            ALL_LANGS,
            "cat > /dev/null\necho 'Error in pixReadMem: unknown format' >&2\nexit 1",
        );
        let backend =
            TesseractCliBackend::new("secondary", &program, &[Script::Devanagari], 3, None).unwrap();

        let err = backend
            .recognize(&DynamicImage::new_rgb8(4, 4))
            .err()
            .expect("failing tesseract must be an error");

        assert!(err.to_string().contains("pixReadMem"));
    }

    #[cfg(unix)]
    #[test]
    fn missing_language_pack_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(dir.path(), r"eng\nhin", "exit 0");

        let err = TesseractCliBackend::new("primary", &program, &[Script::Telugu, Script::Latin], 3, None)
            .err()
            .expect("missing tel data must be rejected");

        assert!(err.to_string().contains("tel"));
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_running_process() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let program = fake_tesseract(dir.path(), ALL_LANGS, "cat > /dev/null\nexec sleep 30");
        let backend = Arc::new(
            TesseractCliBackend::new("primary", &program, &[Script::Latin], 3, None).unwrap(),
        );

        let now = Instant::now();
        let worker = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || backend.recognize(&DynamicImage::new_rgb8(4, 4)))
        };
        while backend.running().is_none() {
            assert!(now.elapsed() < Duration::from_secs(10), "tesseract never started");
            thread::sleep(Duration::from_millis(10));
        }
        backend.cancel();

        let result = worker.join().unwrap();
        assert!(result.is_err());
        assert!(now.elapsed() < Duration::from_secs(20));
        assert!(backend.running().is_none());
    }
}
