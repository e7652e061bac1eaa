//! 被测程序准备：把 `.class` 或 `.jar` 放入二进制目录并确定入口类

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::Command;

/// 清空二进制目录并放入被测文件，返回入口类名
///
/// `.class` 文件以文件名（去掉扩展名）作为入口；`.jar` 文件用 `jar_program xf`
/// 解包后读取 `META-INF/MANIFEST.MF` 中的 `Main-Class:`。
pub async fn prepare_subject(file: &Path, bin_dir: &Path, jar_program: &Path) -> Result<String> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid subject file: {}", file.display()))?;

    let kind = SubjectKind::of(file_name)?;
    reset_bin_dir(bin_dir)?;
    fs::copy(file, bin_dir.join(file_name))
        .with_context(|| format!("Failed to copy {} into {}", file.display(), bin_dir.display()))?;

    let entry_point = match kind {
        SubjectKind::Class(stem) => stem,
        SubjectKind::Jar => {
            let status = Command::new(jar_program)
                .arg("xf")
                .arg(file_name)
                .current_dir(bin_dir)
                .status()
                .await
                .with_context(|| format!("Failed to run {}", jar_program.display()))?;
            if !status.success() {
                bail!("Unpacking {file_name} failed: {status}");
            }
            read_manifest_main_class(&bin_dir.join("META-INF"))?
        }
    };

    log::info!("Entry point for {file_name}: {entry_point}");
    Ok(entry_point)
}

enum SubjectKind {
    Class(String),
    Jar,
}

impl SubjectKind {
    fn of(file_name: &str) -> Result<Self> {
        if let Some(stem) = file_name.strip_suffix(".class") {
            if stem.is_empty() {
                bail!("Invalid class file name: {file_name}");
            }
            Ok(Self::Class(stem.to_string()))
        } else if file_name.ends_with(".jar") {
            Ok(Self::Jar)
        } else {
            bail!("File format not supported. Please provide either a .class file or a .jar file")
        }
    }
}

fn reset_bin_dir(bin_dir: &Path) -> Result<()> {
    if bin_dir.exists() {
        fs::remove_dir_all(bin_dir).with_context(|| {
            format!("Couldn't delete files in binaries directory {}", bin_dir.display())
        })?;
    }
    fs::create_dir_all(bin_dir)?;
    Ok(())
}

fn read_manifest_main_class(meta_inf: &Path) -> Result<String> {
    let manifest = meta_inf.join("MANIFEST.MF");
    let content = fs::read_to_string(&manifest)
        .with_context(|| format!("MANIFEST.MF file couldn't be found in {}", meta_inf.display()))?;
    parse_main_class(&content)
        .ok_or_else(|| anyhow!("Incorrect MANIFEST.MF file provided: no Main-Class entry"))
}

/// 读取清单中的 `Main-Class:` 值
pub fn parse_main_class(manifest: &str) -> Option<String> {
    manifest
        .lines()
        .find_map(|line| line.trim_end().strip_prefix("Main-Class:"))
        .map(str::trim)
        .filter(|class| !class.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_class() {
        let manifest = "Manifest-Version: 1.0\r\nCreated-By: 17.0.2\r\nMain-Class: com.example.App\r\n\r\n";
        assert_eq!(parse_main_class(manifest), Some("com.example.App".to_string()));
        assert_eq!(parse_main_class("Manifest-Version: 1.0\n"), None);
        assert_eq!(parse_main_class("Main-Class:   \n"), None);
    }

    #[tokio::test]
    async fn test_class_file_entry_point() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let subject = temp_dir.path().join("Allocator.class");
        fs::write(&subject, b"\xca\xfe\xba\xbe")?;
        let bin_dir = temp_dir.path().join("work/bin");
        fs::create_dir_all(&bin_dir)?;
        fs::write(bin_dir.join("stale.class"), b"old")?;

        let entry = prepare_subject(&subject, &bin_dir, Path::new("jar")).await?;
        assert_eq!(entry, "Allocator");
        assert!(bin_dir.join("Allocator.class").exists());
        assert!(!bin_dir.join("stale.class").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_format() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let subject = temp_dir.path().join("app.war");
        fs::write(&subject, b"")?;

        let err = prepare_subject(&subject, &temp_dir.path().join("bin"), Path::new("jar"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File format not supported"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_jar_manifest_entry_point() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let subject = temp_dir.path().join("bench.jar");
        fs::write(&subject, b"PK")?;

        // 用脚本代替 jar 工具，只生成清单
        let fake_jar = temp_dir.path().join("fake-jar.sh");
        fs::write(
            &fake_jar,
            "#!/bin/sh\nmkdir -p META-INF\nprintf 'Manifest-Version: 1.0\\nMain-Class: bench.Main\\n' > META-INF/MANIFEST.MF\n",
        )?;
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&fake_jar, fs::Permissions::from_mode(0o755))?;
        }

        let entry = prepare_subject(&subject, &temp_dir.path().join("bin"), &fake_jar).await?;
        assert_eq!(entry, "bench.Main");
        Ok(())
    }
}
