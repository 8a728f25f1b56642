use ndarray::{array, Array1, Array2};

use crate::error::AnvilError;
use crate::models::{ActorCritic, ActorCriticWithTarget, Model, PolicyOutput, TD3ActorCritic};
use crate::updaters::{
    ClippedPolicyBatch, DeterministicPolicyGradient, ObservationBatch, PolicyBatch, PolicyGradient, ProximalPolicyClip,
    ProximalPolicyClipConfig, QBatch, QRegression, SoftPolicyGradient, SoftPolicyGradientConfig, Updater,
    UpdaterConfig, ValueBatch, ValueRegression,
};
use super::{continuous_critic, deterministic_actor, gaussian_actor, value_critic};

fn config() -> UpdaterConfig {
    UpdaterConfig::default().learning_rate(0.01)
}

fn observations() -> Array2<f32> {
    array![[0.5, -0.3], [-0.8, 0.1], [0.2, 0.9], [0.0, -0.6]]
}

fn actions() -> Array2<f32> {
    array![[0.3], [-0.2], [0.0], [0.7]]
}

fn returns() -> Array1<f32> {
    array![1.0, -0.5, 0.25, 0.8]
}

/// Location and scale of the policy at the fixed observations.
fn gaussian_params(model: &dyn Model) -> (Array2<f32>, Array2<f32>) {
    let dist = model.policy_network().get_action_distribution(observations().view()).unwrap();
    (dist.location().unwrap().clone(), dist.scale().unwrap().clone())
}

fn policy_actions(model: &dyn Model) -> Array2<f32> {
    match model.policy_network().forward(observations().view()).unwrap() {
        PolicyOutput::Action(actions) => actions,
        PolicyOutput::Distribution(_) => panic!("expected a deterministic actor"),
    }
}

fn state_values(model: &dyn Model) -> Array2<f32> {
    model.value_networks()[0].forward(observations().view(), None).unwrap()
}

fn action_values(model: &dyn Model) -> Array2<f32> {
    model.value_networks()[0]
        .forward(observations().view(), Some(actions().view()))
        .unwrap()
}

fn policy_batch() -> PolicyBatch {
    PolicyBatch::new(observations(), actions(), array![1.0, -0.5, 2.0, 0.3]).unwrap()
}

fn clipped_batch(model: &dyn Model) -> ClippedPolicyBatch {
    let old_log_probs = model
        .policy_network()
        .get_action_distribution(observations().view())
        .unwrap()
        .log_prob(actions().view())
        .unwrap();
    ClippedPolicyBatch::new(observations(), actions(), array![1.0, -0.5, 2.0, 0.3], old_log_probs).unwrap()
}

#[test]
fn test_policy_gradient_leaves_independent_critic() {
    let model = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let values_before = state_values(&model);
    let (loc_before, scale_before) = gaussian_params(&model);

    let mut updater = PolicyGradient::new(config()).unwrap();
    let metrics = updater.apply(&model, &policy_batch()).unwrap();
    assert!(metrics.loss.is_finite());
    assert!(metrics.grad_norm > 0.0);

    let (loc_after, scale_after) = gaussian_params(&model);
    assert_ne!(loc_before, loc_after);
    assert_ne!(scale_before, scale_after);
    assert_eq!(values_before, state_values(&model));
}

#[test]
fn test_policy_gradient_moves_shared_critic() {
    let model = ActorCritic::new(gaussian_actor(), value_critic(), false, true).unwrap();
    let values_before = state_values(&model);
    let mut updater = PolicyGradient::new(config()).unwrap();
    updater.apply(&model, &policy_batch()).unwrap();
    assert_ne!(values_before, state_values(&model));
}

#[test]
fn test_proximal_policy_clip_isolation_and_sharing() {
    let independent = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let shared = ActorCritic::new(gaussian_actor(), value_critic(), true, true).unwrap();

    for (model, shares) in [(&independent, false), (&shared, true)] {
        let values_before = state_values(model);
        let (loc_before, scale_before) = gaussian_params(model);
        let batch = clipped_batch(model);

        let mut updater = ProximalPolicyClip::new(ProximalPolicyClipConfig::default().updater(config())).unwrap();
        updater.apply(model, &batch).unwrap();

        let (loc_after, scale_after) = gaussian_params(model);
        assert_ne!(loc_before, loc_after);
        assert_ne!(scale_before, scale_after);
        assert_eq!(values_before != state_values(model), shares);
    }
}

/// Behaviour log-probabilities shifted so that every ratio is `exp(shift)`.
fn shifted_batch(model: &dyn Model, advantages: Array1<f32>, shift: f32) -> ClippedPolicyBatch {
    let old_log_probs = clipped_batch(model).old_log_probs.mapv(|lp| lp - shift);
    ClippedPolicyBatch::new(observations(), actions(), advantages, old_log_probs).unwrap()
}

#[test]
fn test_proximal_policy_clip_bounds_the_step() {
    let clip_range: f32 = 0.2;
    let cases: [(Array1<f32>, f32, f32); 2] = [
        // ratio e above 1 + eps with positive advantages
        (array![1.0, 0.5, 2.0, 0.3], 1.0, 1.0 + clip_range),
        // ratio 1/e below 1 - eps with negative advantages
        (array![-1.0, -0.5, -2.0, -0.3], -1.0, 1.0 - clip_range),
    ];

    for (advantages, shift, bound) in cases {
        let model = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
        let (loc_before, scale_before) = gaussian_params(&model);
        let expected = -bound * advantages.mean().unwrap();
        let batch = shifted_batch(&model, advantages, shift);

        let config = ProximalPolicyClipConfig::default().clip_range(clip_range).updater(config());
        let metrics = ProximalPolicyClip::new(config).unwrap().apply(&model, &batch).unwrap();

        assert!((metrics.loss - expected).abs() < 1e-5, "loss {} expected {}", metrics.loss, expected);
        assert_eq!(metrics.grad_norm, 0.0);
        assert!(!metrics.clipped);
        assert_eq!((loc_before, scale_before), gaussian_params(&model));
    }
}

#[test]
fn test_proximal_policy_clip_keeps_gradient_on_pessimistic_side() {
    // A ratio above 1 + eps with a negative advantage is not clipped.
    let model = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let (loc_before, _) = gaussian_params(&model);
    let batch = shifted_batch(&model, array![-1.0, -0.5, -2.0, -0.3], 1.0);

    let config = ProximalPolicyClipConfig::default().updater(config());
    let metrics = ProximalPolicyClip::new(config).unwrap().apply(&model, &batch).unwrap();

    let expected = -std::f32::consts::E * -0.95;
    assert!((metrics.loss - expected).abs() < 1e-4, "loss {} expected {}", metrics.loss, expected);
    assert!(metrics.grad_norm > 0.0);
    assert_ne!(loc_before, gaussian_params(&model).0);
}

#[test]
fn test_proximal_policy_clip_rejects_bad_range() {
    for clip_range in [0.0, 1.0, -0.1] {
        let config = ProximalPolicyClipConfig::default().clip_range(clip_range);
        assert!(matches!(
            ProximalPolicyClip::new(config),
            Err(AnvilError::InvalidParameter { .. })
        ));
    }
}

#[test]
fn test_deterministic_policy_gradient() {
    let independent = ActorCritic::new(deterministic_actor(), continuous_critic(), false, false).unwrap();
    let shared = ActorCritic::new(deterministic_actor(), continuous_critic(), false, true).unwrap();
    let batch = ObservationBatch::new(observations()).unwrap();

    for (model, shares) in [(&independent, false), (&shared, true)] {
        let actions_before = policy_actions(model);
        let values_before = action_values(model);

        let mut updater = DeterministicPolicyGradient::new(config()).unwrap();
        updater.apply(model, &batch).unwrap();

        assert_ne!(actions_before, policy_actions(model));
        assert_eq!(values_before != action_values(model), shares);
    }
}

#[test]
fn test_soft_policy_gradient() {
    let independent = ActorCritic::new(gaussian_actor(), continuous_critic(), false, false).unwrap();
    let shared = ActorCritic::new(gaussian_actor(), continuous_critic(), false, true).unwrap();
    let batch = ObservationBatch::new(observations()).unwrap();

    for (model, shares) in [(&independent, false), (&shared, true)] {
        let (loc_before, scale_before) = gaussian_params(model);
        let values_before = action_values(model);

        let config = SoftPolicyGradientConfig::default().updater(config());
        let mut updater = SoftPolicyGradient::new(config).unwrap().with_seed(7);
        updater.apply(model, &batch).unwrap();

        let (loc_after, scale_after) = gaussian_params(model);
        assert_ne!(loc_before, loc_after);
        assert_ne!(scale_before, scale_after);
        assert_eq!(values_before != action_values(model), shares);
    }
}

#[test]
fn test_value_regression_isolation_and_sharing() {
    let independent = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let shared = ActorCritic::new(gaussian_actor(), value_critic(), false, true).unwrap();
    let batch = ValueBatch::new(observations(), returns()).unwrap();

    for (model, shares) in [(&independent, false), (&shared, true)] {
        let values_before = state_values(model);
        let (loc_before, scale_before) = gaussian_params(model);

        let mut updater = ValueRegression::new(config()).unwrap();
        updater.apply(model, &batch).unwrap();

        assert_ne!(values_before, state_values(model));
        let (loc_after, scale_after) = gaussian_params(model);
        assert_eq!(loc_before != loc_after, shares);
        // log_std is owned by the policy head and never reachable from the critic.
        assert_eq!(scale_before, scale_after);
    }
}

#[test]
fn test_q_regression_isolation_and_sharing() {
    let independent = ActorCritic::new(deterministic_actor(), continuous_critic(), false, false).unwrap();
    let shared = ActorCritic::new(deterministic_actor(), continuous_critic(), false, true).unwrap();
    let batch = QBatch::new(observations(), actions(), returns()).unwrap();

    for (model, shares) in [(&independent, false), (&shared, true)] {
        let actions_before = policy_actions(model);
        let values_before = action_values(model);

        let mut updater = QRegression::new(config()).unwrap();
        updater.apply(model, &batch).unwrap();

        assert_ne!(values_before, action_values(model));
        assert_eq!(actions_before != policy_actions(model), shares);
    }
}

#[test]
fn test_q_regression_on_value_critics() {
    let independent = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let shared_encoder = ActorCritic::new(gaussian_actor(), value_critic(), true, false).unwrap();
    let shared = ActorCritic::new(gaussian_actor(), value_critic(), true, true).unwrap();
    let batch = QBatch::without_actions(observations(), returns()).unwrap();

    for (model, shares_torso) in [(&independent, false), (&shared_encoder, false), (&shared, true)] {
        let values_before = state_values(model);
        let (loc_before, _) = gaussian_params(model);

        let mut updater = QRegression::new(config()).unwrap();
        updater.apply(model, &batch).unwrap();

        assert_ne!(values_before, state_values(model));
        let (loc_after, _) = gaussian_params(model);
        assert_eq!(loc_before != loc_after, shares_torso);
    }

    // Actions are accepted and ignored by value heads.
    let with_actions = QBatch::new(observations(), actions(), returns()).unwrap();
    let values_before = state_values(&independent);
    QRegression::new(config()).unwrap().apply(&independent, &with_actions).unwrap();
    assert_ne!(values_before, state_values(&independent));
}

#[test]
fn test_q_regression_needs_actions_for_continuous_q() {
    let model = ActorCritic::new(deterministic_actor(), continuous_critic(), false, false).unwrap();
    let batch = QBatch::without_actions(observations(), returns()).unwrap();
    let values_before = action_values(&model);
    assert!(matches!(
        QRegression::new(config()).unwrap().apply(&model, &batch),
        Err(AnvilError::InvalidParameter { .. })
    ));
    assert_eq!(values_before, action_values(&model));
}

#[test]
fn test_value_regression_reduces_loss() {
    let model = ActorCritic::new(gaussian_actor(), value_critic(), false, false).unwrap();
    let batch = ValueBatch::new(observations(), returns()).unwrap();
    let mut updater = ValueRegression::new(UpdaterConfig::default().learning_rate(0.02)).unwrap();

    let first = updater.apply(&model, &batch).unwrap().loss;
    let mut last = first;
    for _ in 0..300 {
        last = updater.apply(&model, &batch).unwrap().loss;
    }
    assert!(last < first, "loss went from {} to {}", first, last);
}

#[test]
fn test_q_regression_trains_both_twin_critics() {
    let model = TD3ActorCritic::new(deterministic_actor(), continuous_critic(), 0.005, false, false).unwrap();
    let obs = observations();
    let act = actions();
    let q1_before = model.forward_critic_at(0, obs.view(), Some(act.view())).unwrap();
    let q2_before = model.forward_critic_at(1, obs.view(), Some(act.view())).unwrap();
    let target_before = model.forward_target_critic(obs.view(), Some(act.view())).unwrap();

    let mut updater = QRegression::new(config()).unwrap();
    updater.apply(&model, &QBatch::new(obs.clone(), act.clone(), returns()).unwrap()).unwrap();

    assert_ne!(q1_before, model.forward_critic_at(0, obs.view(), Some(act.view())).unwrap());
    assert_ne!(q2_before, model.forward_critic_at(1, obs.view(), Some(act.view())).unwrap());
    assert_eq!(target_before, model.forward_target_critic(obs.view(), Some(act.view())).unwrap());
}

#[test]
fn test_updates_never_touch_target() {
    let model = ActorCriticWithTarget::new(gaussian_actor(), value_critic(), 0.01, false, true).unwrap();
    let target_policy = model.forward_target(observations().view()).unwrap();
    let target_values = model.forward_target_critic(observations().view(), None).unwrap();

    PolicyGradient::new(config()).unwrap().apply(&model, &policy_batch()).unwrap();
    ValueRegression::new(config())
        .unwrap()
        .apply(&model, &ValueBatch::new(observations(), returns()).unwrap())
        .unwrap();

    assert_eq!(target_policy, model.forward_target(observations().view()).unwrap());
    assert_eq!(target_values, model.forward_target_critic(observations().view(), None).unwrap());
}

#[test]
fn test_head_mismatch_errors() {
    let deterministic = ActorCritic::new(deterministic_actor(), continuous_critic(), false, false).unwrap();
    let gaussian = ActorCritic::new(gaussian_actor(), continuous_critic(), false, false).unwrap();
    let obs_batch = ObservationBatch::new(observations()).unwrap();

    let result = PolicyGradient::new(config()).unwrap().apply(&deterministic, &policy_batch());
    assert!(matches!(result, Err(AnvilError::ActionHeadMismatch { .. })));

    let batch = ClippedPolicyBatch::new(observations(), actions(), Array1::ones(4), Array1::zeros(4)).unwrap();
    let result = ProximalPolicyClip::new(ProximalPolicyClipConfig::default())
        .unwrap()
        .apply(&deterministic, &batch);
    assert!(matches!(result, Err(AnvilError::ActionHeadMismatch { .. })));

    let result = DeterministicPolicyGradient::new(config()).unwrap().apply(&gaussian, &obs_batch);
    assert!(matches!(result, Err(AnvilError::ActionHeadMismatch { .. })));

    let result = SoftPolicyGradient::new(SoftPolicyGradientConfig::default())
        .unwrap()
        .apply(&deterministic, &obs_batch);
    assert!(matches!(result, Err(AnvilError::ActionHeadMismatch { .. })));
}

#[test]
fn test_critic_kind_checked() {
    let with_value_critic = ActorCritic::new(deterministic_actor(), value_critic(), false, false).unwrap();
    let obs_batch = ObservationBatch::new(observations()).unwrap();
    assert!(DeterministicPolicyGradient::new(config())
        .unwrap()
        .apply(&with_value_critic, &obs_batch)
        .is_err());

    let with_q_critic = ActorCritic::new(deterministic_actor(), continuous_critic(), false, false).unwrap();
    let value_batch = ValueBatch::new(observations(), returns()).unwrap();
    assert!(ValueRegression::new(config()).unwrap().apply(&with_q_critic, &value_batch).is_err());
}

#[test]
fn test_batch_row_counts_checked() {
    let result = PolicyBatch::new(observations(), actions(), array![1.0]);
    assert!(matches!(result, Err(AnvilError::DimensionMismatch { .. })));
    let result = ValueBatch::new(Array2::zeros((0, 2)), Array1::zeros(0));
    assert!(result.is_err());
}

#[test]
fn test_actor_alone_is_a_model() {
    let actor = gaussian_actor();
    let (loc_before, _) = gaussian_params(&actor);
    PolicyGradient::new(config()).unwrap().apply(&actor, &policy_batch()).unwrap();
    let (loc_after, _) = gaussian_params(&actor);
    assert_ne!(loc_before, loc_after);
}
