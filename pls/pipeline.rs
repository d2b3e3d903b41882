// ========================================================================================
//
//                      Orchestration of a behavioral PLS run
//
// ========================================================================================
//
// Validates the inputs, resolves the configuration once, decomposes the observed
// cross-block matrix and then runs the permutation test and the bootstrap side by
// side on a dedicated worker pool. Nothing here does numerical work of its own.

use crate::bootstrap::{BootstrapOptions, bootstrap_test};
use crate::config::PlsConfig;
use crate::crosscov::cross_block;
use crate::decompose::{latent_scores, svd, varexp};
use crate::permutation::{PermutationOptions, permutation_test};
use crate::progress::{NoopProgress, ResampleProgress};
use crate::resample::CancellationToken;
use crate::result::PlsResult;
use crate::types::{Dataset, PlsError};

/// Runs the full analysis with no progress reporting and no cancellation.
pub fn behavioral_pls(dataset: &Dataset, config: &PlsConfig) -> Result<PlsResult, PlsError> {
    behavioral_pls_with(dataset, config, &CancellationToken::new(), &NoopProgress)
}

/// Runs the full analysis, reporting progress and honoring cancellation.
///
/// A cancelled run returns [`PlsError::Interrupted`]; partial results are never
/// handed out.
pub fn behavioral_pls_with<P>(
    dataset: &Dataset,
    config: &PlsConfig,
    cancel: &CancellationToken,
    progress: &P,
) -> Result<PlsResult, PlsError>
where
    P: ResampleProgress + ?Sized,
{
    let resolved = config.resolve()?;
    let x = dataset.x();
    let y = dataset.y();

    log::info!(
        "Behavioral PLS on {} samples: {} X features, {} Y features ({:?} mode, seed {}, {} threads)",
        dataset.n_samples(),
        x.ncols(),
        y.ncols(),
        resolved.mode,
        resolved.seed,
        resolved.threads
    );

    let block = cross_block(x, y, resolved.mode)?;
    if block.constant_column_count() > 0 {
        log::warn!(
            "Constant columns were zero-filled and carry no loading: X {:?}, Y {:?}",
            block.x_constant_columns,
            block.y_constant_columns
        );
    }
    if block.is_zero() {
        return Err(PlsError::Degenerate(
            "every entry of the cross-block matrix is zero; one block has no varying column"
                .to_string(),
        ));
    }

    let observed = svd(block.matrix.view())?;
    let effect_sizes = varexp(observed.s.view());
    let scores = latent_scores(x, y, &observed, resolved.mode);
    log::info!(
        "Decomposed into {} latent variables; leading singular value {:.4} ({:.1}% of covariance)",
        observed.n_components(),
        observed.s[0],
        effect_sizes[0] * 100.0
    );

    let permutation_options = PermutationOptions {
        n_perm: resolved.n_perm,
        seed: resolved.seed,
        mode: resolved.mode,
        rotate: resolved.rotate,
        n_split: resolved.n_split,
        ci: resolved.ci,
        max_failure_fraction: resolved.max_failure_fraction,
    };
    let bootstrap_options = BootstrapOptions {
        n_boot: resolved.n_boot,
        seed: resolved.seed,
        mode: resolved.mode,
        ci: resolved.ci,
        max_failure_fraction: resolved.max_failure_fraction,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(resolved.threads)
        .build()
        .map_err(|err| PlsError::ThreadPool(err.to_string()))?;

    let (permutation, bootstrap) = pool.install(|| {
        rayon::join(
            || permutation_test(x, y, &observed, &permutation_options, cancel, progress),
            || bootstrap_test(x, y, &observed, &bootstrap_options, cancel, progress),
        )
    });
    let permutation = permutation?;
    let bootstrap = bootstrap?;

    if cancel.is_cancelled() {
        return Err(PlsError::Interrupted);
    }

    Ok(PlsResult {
        n_samples: dataset.n_samples(),
        singular_values: observed.s,
        effect_sizes,
        x_loadings: observed.u,
        y_loadings: observed.v,
        x_scores: scores.x_scores,
        y_scores: scores.y_scores,
        y_correlations: scores.y_correlations,
        x_constant_columns: block.x_constant_columns,
        y_constant_columns: block.y_constant_columns,
        x_labels: dataset.x_labels().map(<[String]>::to_vec),
        y_labels: dataset.y_labels().map(<[String]>::to_vec),
        permutation,
        bootstrap,
        config: resolved,
    })
}
