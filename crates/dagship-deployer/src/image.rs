//! The image build stage: runtime version resolution, catalog checks and
//! building (or tagging) the deploy image.

use chrono::{DateTime, Utc};
use dagship_core::Error;
use dagship_core::engine::{BuildContext, ImageHandler, RUNTIME_IMAGE_LABEL};
use dagship_core::platform::RuntimeRelease;
use dagship_core::version::{RuntimeVersion, is_valid_tag, is_valid_upgrade, latest_stable};
use dagship_executor::{Dockerfile, image_tag};
use std::cmp::Ordering;
use std::io::Write;
use tracing::{debug, info, warn};

use crate::DeployError;

/// Registry login used with platform tokens.
pub const REGISTRY_USERNAME: &str = "cli";

/// Push tag for a deploy started at `now`, e.g. `deploy-2026-03-01T14-05`.
pub fn deploy_tag(now: DateTime<Utc>) -> String {
    now.format("deploy-%Y-%m-%dT%H-%M").to_string()
}

/// Image registry host for a platform domain.
pub fn registry_host(domain: &str) -> String {
    format!("images.{}", domain)
}

/// Registry repository for a deployment: `<registry>/<organization>/<release>`.
/// The organization segment is left out when unknown.
pub fn repository(registry: &str, organization: &str, release_name: &str) -> String {
    if organization.is_empty() {
        format!("{}/{}", registry, release_name)
    } else {
        format!("{}/{}/{}", registry, organization, release_name)
    }
}

/// Runtime tag of the Dockerfile's base image, when it names a runtime.
///
/// A tag counts when the catalog lists it or it is a plain release version.
/// Custom tags such as `4.2.5-base` yield `None` so the version comes from
/// elsewhere.
pub fn dockerfile_runtime_tag(
    ctx: &BuildContext,
    catalog: &[RuntimeRelease],
) -> Result<Option<String>, DeployError> {
    let path = ctx.dockerfile_path();
    let dockerfile =
        Dockerfile::parse_file(&path).map_err(|source| DeployError::DockerfileParse {
            path: path.display().to_string(),
            source,
        })?;

    let Some(base) = dockerfile.base_image() else {
        return Ok(None);
    };
    let tag = image_tag(&base);
    debug!(base_image = %base, tag, "Dockerfile base image");

    let listed = catalog.iter().any(|r| r.version == tag);
    let release = tag
        .parse::<RuntimeVersion>()
        .is_ok_and(|v| !v.is_pre_release());
    Ok((listed || release).then(|| tag.to_string()))
}

/// Pick the runtime version to deploy: the first non-empty candidate in
/// priority order.
pub fn resolve_runtime_version(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Check the candidate against the release catalog and the deployment's
/// current runtime.
pub fn check_runtime_version(
    catalog: &[RuntimeRelease],
    current: &str,
    candidate: &str,
) -> Result<(), DeployError> {
    for version in [current, candidate] {
        if !version.is_empty() && version.parse::<RuntimeVersion>().is_err() {
            warn!(version, "Unparseable runtime version, comparing lexically");
        }
    }

    let known: Vec<&str> = catalog.iter().map(|r| r.version.as_str()).collect();
    if !is_valid_tag(&known, candidate) {
        return Err(DeployError::InvalidRuntimeTag {
            tag: candidate.to_string(),
        });
    }
    if !is_valid_upgrade(current, candidate) {
        return Err(DeployError::InvalidUpgrade {
            current: current.to_string(),
            candidate: candidate.to_string(),
        });
    }
    Ok(())
}

/// Notice shown when the catalog has a newer stable release than `version`.
pub fn newer_release_notice(catalog: &[RuntimeRelease], version: &str) -> Option<String> {
    let latest = latest_stable(catalog.iter().map(|r| r.version.as_str()))?;
    let newer = match (
        latest.parse::<RuntimeVersion>(),
        version.parse::<RuntimeVersion>(),
    ) {
        (Ok(latest), Ok(current)) => latest.cmp(&current) == Ordering::Greater,
        _ => false,
    };
    newer.then(|| {
        format!(
            "WARNING! You are deploying runtime version {} but {} is available. \
             Consider upgrading the base image in your Dockerfile.",
            version, latest
        )
    })
}

/// Runtime label of an image that may not exist locally yet.
pub async fn existing_label(images: &dyn ImageHandler) -> Result<String, DeployError> {
    match images.get_label(RUNTIME_IMAGE_LABEL).await {
        Ok(label) => Ok(label),
        Err(Error::NotFound(_)) => Ok(String::new()),
        Err(e) => Err(DeployError::step("inspect image")(e)),
    }
}

/// Inputs to the build stage.
pub struct BuildRequest<'a> {
    pub ctx: BuildContext,
    /// Local image to tag instead of building.
    pub source_image: Option<&'a str>,
    /// User override, wins over every detected version.
    pub runtime_override: Option<&'a str>,
    /// Deployment's current runtime.
    pub current_version: &'a str,
    pub catalog: &'a [RuntimeRelease],
}

/// Resolve the runtime version, validate it and produce the deploy image.
/// Returns the runtime version the image was checked against.
///
/// Version priority: override, then the supplied image's label or the
/// Dockerfile base image tag, then the previously built image's label, then
/// the deployment's current runtime.
pub async fn build_image(
    images: &dyn ImageHandler,
    mut request: BuildRequest<'_>,
    out: &mut dyn Write,
) -> Result<String, DeployError> {
    let runtime_version = match request.source_image {
        Some(source) => {
            images
                .tag_local_image(source)
                .await
                .map_err(DeployError::step("tag local image"))?;
            let label = images
                .get_label(RUNTIME_IMAGE_LABEL)
                .await
                .map_err(DeployError::step("inspect image"))?;
            resolve_runtime_version(&[
                request.runtime_override,
                Some(label.as_str()),
                Some(request.current_version),
            ])
        }
        None => {
            // A stale local image must not outrank the Dockerfile
            let dockerfile_tag = dockerfile_runtime_tag(&request.ctx, request.catalog)?;
            let previous = match dockerfile_tag {
                Some(_) => String::new(),
                None => existing_label(images).await?,
            };
            resolve_runtime_version(&[
                request.runtime_override,
                dockerfile_tag.as_deref(),
                Some(previous.as_str()),
                Some(request.current_version),
            ])
        }
    };

    check_runtime_version(request.catalog, request.current_version, &runtime_version)?;
    if let Some(notice) = newer_release_notice(request.catalog, &runtime_version) {
        writeln!(out, "{}", notice)?;
    }

    if request.source_image.is_some() {
        info!(image = %images.image(), runtime_version = %runtime_version, "Using local image");
        return Ok(runtime_version);
    }

    request.ctx.runtime_tag = runtime_version.clone();
    writeln!(out, "Building image {}...", request.ctx.image)?;
    images
        .build(&request.ctx)
        .await
        .map_err(DeployError::step("build image"))?;

    // The built image's own label is authoritative when it disagrees
    let label = images
        .get_label(RUNTIME_IMAGE_LABEL)
        .await
        .map_err(DeployError::step("inspect image"))?;
    if !label.is_empty() && label != runtime_version {
        warn!(label = %label, expected = %runtime_version, "Built image reports a different runtime");
        check_runtime_version(request.catalog, request.current_version, &label)?;
        return Ok(label);
    }

    Ok(runtime_version)
}
