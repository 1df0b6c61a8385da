//! 작업 디렉토리 헬퍼
//!
//! 테스트는 저장소 안의 모듈을 직접 건드리지 않고, 저장소를 임시 디렉토리로
//! 복사한 사본에서 `tofu`를 실행합니다. 모듈 간 상대 경로(`../../modules/...`)가
//! 유지되도록 저장소 루트 전체를 복사하고 하위 폴더 경로를 돌려줍니다.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use infraguard_core::config::WorkspaceConfig;

use crate::error::HarnessError;

/// 저장소 루트를 지정하는 환경변수
pub const REPO_ROOT_ENV: &str = "INFRAGUARD_REPO_ROOT";

/// 복사하지 않는 디렉토리 이름 (숨김 항목은 별도로 제외)
const SKIPPED_DIRS: &[&str] = &[".terraform"];

/// 저장소 루트를 찾습니다.
///
/// 설정값, `INFRAGUARD_REPO_ROOT`, 현재 디렉토리에서 위로 `.git` 탐색 순입니다.
pub fn repo_root(configured: &str) -> Result<PathBuf, HarnessError> {
    if !configured.trim().is_empty() {
        return Ok(PathBuf::from(configured.trim()));
    }
    if let Ok(root) = std::env::var(REPO_ROOT_ENV) {
        if !root.trim().is_empty() {
            return Ok(PathBuf::from(root.trim()));
        }
    }

    let cwd = std::env::current_dir()?;
    find_git_root(&cwd).ok_or_else(|| {
        HarnessError::Workspace(format!(
            "no .git directory found above {} (set {REPO_ROOT_ENV} or workspace.repo_root)",
            cwd.display()
        ))
    })
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// 임시 디렉토리에 복사된 모듈
///
/// drop되면 임시 디렉토리도 삭제됩니다.
#[derive(Debug)]
pub struct StagedModule {
    _tmp: TempDir,
    path: PathBuf,
}

impl StagedModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 임시 사본을 blocking 스레드에서 삭제합니다. 삭제 실패는 에러로 반환합니다.
    pub async fn remove(self) -> Result<(), HarnessError> {
        let tmp = self._tmp;
        tokio::task::spawn_blocking(move || tmp.close())
            .await
            .map_err(|e| HarnessError::Workspace(format!("removal task failed: {e}")))??;
        Ok(())
    }
}

/// 저장소 루트를 임시 디렉토리로 복사하고 `<rel>/<name>` 경로를 반환합니다.
pub async fn copy_module_to_temp(
    root: &Path,
    rel: &str,
    name: &str,
) -> Result<StagedModule, HarnessError> {
    let source = root.join(rel).join(name);
    if !source.is_dir() {
        return Err(HarnessError::Workspace(format!(
            "module directory not found: {}",
            source.display()
        )));
    }

    let root = root.to_path_buf();
    let sub = Path::new(rel).join(name);
    tokio::task::spawn_blocking(move || -> Result<StagedModule, HarnessError> {
        let tmp = tempfile::Builder::new().prefix("infraguard-").tempdir()?;
        copy_tree(&root, tmp.path())?;
        let path = tmp.path().join(&sub);
        debug!(from = %root.display(), to = %path.display(), "staged module");
        Ok(StagedModule { _tmp: tmp, path })
    })
    .await
    .map_err(|e| HarnessError::Workspace(format!("staging task failed: {e}")))?
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_skipped(&name) {
            continue;
        }

        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
        // 심볼릭 링크는 따라가지 않음
    }
    Ok(())
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name) || name.contains(".tfstate")
}

/// 저장소 레이아웃 (루트와 모듈/환경/앱 디렉토리)
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    modules_dir: String,
    envs_dir: String,
    apps_dir: String,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_dirs(root, &WorkspaceConfig::default())
    }

    fn with_dirs(root: impl Into<PathBuf>, config: &WorkspaceConfig) -> Self {
        Self {
            root: root.into(),
            modules_dir: config.modules_dir.clone(),
            envs_dir: config.envs_dir.clone(),
            apps_dir: config.apps_dir.clone(),
        }
    }

    /// `[workspace]` 설정에서 레이아웃을 만듭니다 (루트 탐색 포함).
    pub fn from_config(config: &WorkspaceConfig) -> Result<Self, HarnessError> {
        let root = repo_root(&config.repo_root)?;
        Ok(Self::with_dirs(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn stage_module(&self, name: &str) -> Result<StagedModule, HarnessError> {
        copy_module_to_temp(&self.root, &self.modules_dir, name).await
    }

    pub async fn stage_env(&self, name: &str) -> Result<StagedModule, HarnessError> {
        copy_module_to_temp(&self.root, &self.envs_dir, name).await
    }

    /// 예: `stage_app("neo4j/test")`
    pub async fn stage_app(&self, name: &str) -> Result<StagedModule, HarnessError> {
        copy_module_to_temp(&self.root, &self.apps_dir, name).await
    }
}

/// 리소스 이름에 붙일 6자리 소문자 영숫자 ID
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_owned()
}
