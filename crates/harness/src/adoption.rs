//! 삭제할 수 없는 클라우드 리소스(KMS keyring/key)의 adoption 워크플로우
//!
//! KMS keyring과 key는 GCP에서 삭제되지 않으므로, 같은 이름으로 다시 apply하면
//! "already exists"로 실패합니다. 그래서:
//!
//! 1. apply 전에 각 리소스의 존재 여부를 gcloud `describe`로 확인하고,
//!    존재하면 `tofu import`로 state에 편입합니다.
//! 2. cleanup 시에는 일시적인 리소스만 `-target`으로 destroy하고,
//!    adoption 대상은 `state rm`으로 state에서만 제거합니다.
//! 3. 마지막으로 버킷을 gcloud로 직접 삭제합니다 (이미 없으면 무시).
//!
//! cleanup 단계의 모든 에러는 로그만 남기고 무시합니다.

use std::sync::Arc;

use tracing::{info, warn};

use infraguard_exec::{CommandRunner, Gcloud, Tofu};

use crate::error::HarnessError;
use crate::scope::ScopeHandle;

/// import 대상이 될 수 있는 리소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoptable {
    /// tofu 리소스 주소 (`google_kms_key_ring.state_ring`)
    pub address: String,
    /// `tofu import`에 넘길 ID
    pub import_id: String,
    /// 존재 확인용 gcloud 인자 (종료 코드 0이면 존재)
    pub probe: Vec<String>,
}

/// adoption / cleanup 계획
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdoptionPlan {
    /// 의존 순서 (부모 먼저)
    pub adoptables: Vec<Adoptable>,
    /// cleanup 시 `-target`으로 destroy할 주소
    pub ephemeral_targets: Vec<String>,
    /// 마지막에 gcloud로 직접 삭제할 버킷 (`gs://...`)
    pub fallback_bucket: Option<String>,
}

/// adopt 결과 (주소, import 여부)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdoptionOutcome {
    pub resources: Vec<(String, bool)>,
}

impl AdoptionOutcome {
    pub fn imported(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .filter(|(_, imported)| *imported)
            .map(|(address, _)| address.as_str())
    }

    pub fn was_imported(&self, address: &str) -> bool {
        self.imported().any(|a| a == address)
    }
}

/// bootstrap 모듈의 KMS 이름들
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsNames {
    pub ring: String,
    pub key: String,
    pub location: String,
    pub ring_id: String,
    pub key_id: String,
}

impl KmsNames {
    pub fn for_project(project: &str, location: &str) -> Self {
        let ring = format!("{project}-tfstate-ring");
        let key = "tfstate-key".to_owned();
        let ring_id = format!("projects/{project}/locations/{location}/keyRings/{ring}");
        let key_id = format!("{ring_id}/cryptoKeys/{key}");
        Self {
            ring,
            key,
            location: location.to_owned(),
            ring_id,
            key_id,
        }
    }
}

pub const STATE_RING_ADDRESS: &str = "google_kms_key_ring.state_ring";
pub const STATE_KEY_ADDRESS: &str = "google_kms_crypto_key.state_key";

/// bootstrap 모듈용 계획을 만듭니다.
pub fn kms_bootstrap_plan(project: &str, location: &str, bucket: &str) -> AdoptionPlan {
    let names = KmsNames::for_project(project, location);
    let probe = |args: &[&str]| args.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();

    AdoptionPlan {
        adoptables: vec![
            Adoptable {
                address: STATE_RING_ADDRESS.to_owned(),
                import_id: names.ring_id.clone(),
                probe: probe(&[
                    "kms",
                    "keyrings",
                    "describe",
                    &names.ring,
                    "--location",
                    location,
                ]),
            },
            Adoptable {
                address: STATE_KEY_ADDRESS.to_owned(),
                import_id: names.key_id.clone(),
                probe: probe(&[
                    "kms",
                    "keys",
                    "describe",
                    &names.key,
                    "--keyring",
                    &names.ring,
                    "--location",
                    location,
                ]),
            },
        ],
        ephemeral_targets: vec![
            "google_storage_bucket_iam_member.extra".to_owned(),
            "google_kms_crypto_key_iam_member.extra".to_owned(),
            "google_storage_bucket.state_bucket".to_owned(),
        ],
        fallback_bucket: Some(format!("gs://{bucket}")),
    }
}

impl AdoptionPlan {
    /// 존재하는 리소스를 state로 import합니다.
    ///
    /// probe 실패는 "없음"으로 취급하며, import 실패는 에러로 반환합니다.
    pub async fn adopt<R: CommandRunner>(
        &self,
        tofu: &Tofu<R>,
        gcloud: &Gcloud<R>,
    ) -> Result<AdoptionOutcome, HarnessError> {
        let mut outcome = AdoptionOutcome::default();
        for adoptable in &self.adoptables {
            let probe: Vec<&str> = adoptable.probe.iter().map(String::as_str).collect();
            let exists = gcloud.succeeds(&probe).await;
            if exists {
                info!(
                    address = %adoptable.address,
                    id = %adoptable.import_id,
                    "resource already exists, importing into state"
                );
                tofu.import(&adoptable.address, &adoptable.import_id).await?;
            } else {
                info!(address = %adoptable.address, "resource absent, will be created");
            }
            outcome.resources.push((adoptable.address.clone(), exists));
        }
        Ok(outcome)
    }

    /// 일시적 리소스 destroy, adoption 대상 state rm, 버킷 삭제 순으로 정리합니다.
    ///
    /// 에러를 반환하지 않습니다. 무시한 에러 메시지 목록을 돌려줍니다.
    pub async fn cleanup<R: CommandRunner>(&self, tofu: &Tofu<R>, gcloud: &Gcloud<R>) -> Vec<String> {
        let mut ignored = Vec::new();

        if !self.ephemeral_targets.is_empty() {
            if let Err(e) = tofu.destroy_targets(&self.ephemeral_targets).await {
                warn!(error = %e, "cleanup: targeted destroy failed (ignored)");
                ignored.push(format!("targeted destroy: {e}"));
            }
        }

        for adoptable in self.adoptables.iter().rev() {
            if let Err(e) = tofu.state_rm(&adoptable.address).await {
                warn!(address = %adoptable.address, error = %e, "cleanup: state rm failed (ignored)");
                ignored.push(format!("state rm {}: {e}", adoptable.address));
            }
        }

        if let Some(bucket) = &self.fallback_bucket {
            if let Err(e) = gcloud
                .run_quiet(&["storage", "buckets", "delete", bucket, "--quiet"])
                .await
            {
                warn!(bucket = %bucket, error = %e, "cleanup: bucket delete failed (ignored)");
                ignored.push(format!("bucket delete {bucket}: {e}"));
            }
        }

        ignored
    }

    /// cleanup을 scope에 등록합니다. init/apply 전에 호출해야 합니다.
    pub fn register_cleanup<R: CommandRunner>(
        self: &Arc<Self>,
        handle: &ScopeHandle,
        tofu: &Arc<Tofu<R>>,
        gcloud: &Gcloud<R>,
    ) {
        let plan = Arc::clone(self);
        let tofu = Arc::clone(tofu);
        let gcloud = gcloud.clone();
        let dir = tofu.dir().to_path_buf();
        handle.register("adoption cleanup", Some(&dir), move || async move {
            plan.cleanup(&tofu, &gcloud).await;
            Ok::<(), HarnessError>(())
        });
    }
}
