//! 이미지 참조 정규화와 해시 추출

use ironwatch_core::types::PodInfo;

use crate::store::ContainerImages;

/// 컨테이너 런타임이 이미지 ID 앞에 붙이는 접두어
const RUNTIME_PREFIXES: &[&str] = &["docker-pullable://", "docker://"];

/// 다이제스트 구분자
const DIGEST_MARKER: &str = "@sha256:";
const BARE_DIGEST_PREFIX: &str = "sha256:";

/// 런타임 접두어를 제거한 이미지 참조를 반환합니다.
pub fn normalize_image_id(image_id: &str) -> &str {
    RUNTIME_PREFIXES
        .iter()
        .find_map(|prefix| image_id.strip_prefix(prefix))
        .unwrap_or(image_id)
}

/// 이미지 참조에서 콘텐츠 해시를 추출합니다.
///
/// `repo/img@sha256:<hex>` 또는 `sha256:<hex>`이면 `<hex>`,
/// 다이제스트가 없으면 정규화된 참조 전체를 반환합니다.
pub fn image_hash(image_ref: &str) -> String {
    let normalized = normalize_image_id(image_ref);
    if let Some((_, digest)) = normalized.rsplit_once(DIGEST_MARKER) {
        return digest.to_owned();
    }
    if let Some(digest) = normalized.strip_prefix(BARE_DIGEST_PREFIX) {
        return digest.to_owned();
    }
    normalized.to_owned()
}

/// Running 상태로 보고된 컨테이너의 (이름 → 정규화된 이미지 참조)를 추출합니다.
///
/// 이미지 ID를 아직 보고하지 않은 컨테이너는 건너뜁니다.
pub fn running_container_images(pod: &PodInfo) -> ContainerImages {
    pod.container_statuses
        .iter()
        .filter(|s| s.running && !s.image_id.is_empty())
        .map(|s| (s.name.clone(), normalize_image_id(&s.image_id).to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironwatch_core::types::ContainerStatus;

    fn status(name: &str, image_id: &str, running: bool) -> ContainerStatus {
        ContainerStatus {
            name: name.to_owned(),
            image: "ignored".to_owned(),
            image_id: image_id.to_owned(),
            running,
        }
    }

    #[test]
    fn strips_runtime_prefix() {
        assert_eq!(
            normalize_image_id("docker-pullable://nginx@sha256:abc"),
            "nginx@sha256:abc"
        );
        assert_eq!(normalize_image_id("nginx@sha256:abc"), "nginx@sha256:abc");
    }

    #[test]
    fn hash_from_digest_reference() {
        assert_eq!(image_hash("repo/img@sha256:aaa"), "aaa");
        assert_eq!(image_hash("docker-pullable://repo/img@sha256:bbb"), "bbb");
    }

    #[test]
    fn hash_from_bare_digest() {
        assert_eq!(image_hash("sha256:ccc"), "ccc");
    }

    #[test]
    fn hash_without_digest_is_full_reference() {
        assert_eq!(image_hash("nginx:1.25"), "nginx:1.25");
    }

    #[test]
    fn only_running_containers_are_extracted() {
        let pod = PodInfo {
            container_statuses: vec![
                status("app", "docker-pullable://repo/img@sha256:aaa", true),
                status("init", "repo/init@sha256:bbb", false),
                status("pending", "", true),
            ],
            ..Default::default()
        };
        let images = running_container_images(&pod);
        assert_eq!(images.len(), 1);
        assert_eq!(images["app"], "repo/img@sha256:aaa");
    }
}
