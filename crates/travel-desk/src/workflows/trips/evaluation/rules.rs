use super::{PolicyRule, PolicyViolation, RuleContext};

pub(crate) const ADVANCE_BOOKING: &str = "advance_booking";
pub(crate) const NIGHTLY_LIMIT: &str = "nightly_limit";
pub(crate) const BUDGET_LIMIT: &str = "budget_limit";
pub(crate) const INSURANCE: &str = "insurance";
pub(crate) const AIRFARE_CLASS: &str = "airfare_class";
pub(crate) const DIRECT_FLIGHT: &str = "direct_flight";
pub(crate) const PREFERRED_AIRLINE: &str = "preferred_airline";
pub(crate) const PREFERRED_HOTEL: &str = "preferred_hotel";
pub(crate) const ACCOMMODATION_TYPE: &str = "accommodation_type";
pub(crate) const GROUND_TRANSPORT: &str = "ground_transport";
pub(crate) const RESTRICTED_DESTINATION: &str = "restricted_destination";

pub(crate) fn standard_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            name: ADVANCE_BOOKING,
            check: advance_booking,
        },
        PolicyRule {
            name: NIGHTLY_LIMIT,
            check: nightly_limit,
        },
        PolicyRule {
            name: BUDGET_LIMIT,
            check: budget_limit,
        },
        PolicyRule {
            name: INSURANCE,
            check: insurance,
        },
        PolicyRule {
            name: AIRFARE_CLASS,
            check: airfare_class,
        },
        PolicyRule {
            name: DIRECT_FLIGHT,
            check: direct_flight,
        },
        PolicyRule {
            name: PREFERRED_AIRLINE,
            check: preferred_airline,
        },
        PolicyRule {
            name: PREFERRED_HOTEL,
            check: preferred_hotel,
        },
        PolicyRule {
            name: ACCOMMODATION_TYPE,
            check: accommodation_type,
        },
        PolicyRule {
            name: GROUND_TRANSPORT,
            check: ground_transport,
        },
        PolicyRule {
            name: RESTRICTED_DESTINATION,
            check: restricted_destination,
        },
    ]
}

fn advance_booking(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let start = ctx.draft.start?;
    let required = i64::from(ctx.policy.booking.advance_booking_days);
    // whole calendar days; a trip starting tomorrow is one day ahead
    let lead_days = (start - ctx.today).num_days();
    if lead_days >= required {
        return None;
    }
    Some(PolicyViolation::new(
        ADVANCE_BOOKING,
        format!(
            "Trips must be booked at least {required} days in advance (this request is {lead_days} days ahead)"
        ),
    ))
}

fn nightly_limit(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let limit = ctx.policy.accommodation.nightly_limit?;
    let (start, end, cost) = (ctx.draft.start?, ctx.draft.end?, ctx.draft.cost_estimate?);
    let nights = (end - start).num_days().max(1);
    let implied_nightly = cost / nights as f64;
    if implied_nightly <= limit {
        return None;
    }
    Some(PolicyViolation::new(
        NIGHTLY_LIMIT,
        format!(
            "Implied nightly cost {implied_nightly:.2} exceeds the policy limit of {limit:.2} ({nights} night(s))"
        ),
    ))
}

fn budget_limit(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let limit = ctx.policy.budget_limit?;
    let cost = ctx.draft.cost_estimate?;
    (cost > limit).then(|| {
        PolicyViolation::new(
            BUDGET_LIMIT,
            format!("Cost estimate {cost:.2} exceeds the trip budget limit of {limit:.2}"),
        )
    })
}

fn insurance(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    if !ctx.policy.insurance_required || ctx.draft.travel.insured != Some(false) {
        return None;
    }
    Some(PolicyViolation::new(
        INSURANCE,
        "Travel insurance is mandatory under this policy",
    ))
}

fn airfare_class(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let requested = ctx.draft.travel.fare_class?;
    let allowed = ctx.policy.booking.airfare_class;
    (requested > allowed).then(|| {
        PolicyViolation::new(
            AIRFARE_CLASS,
            format!(
                "Requested {} fare exceeds the permitted {} class",
                requested.label(),
                allowed.label()
            ),
        )
    })
}

fn direct_flight(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    if !ctx.policy.booking.prefer_direct || ctx.draft.travel.direct_flight != Some(false) {
        return None;
    }
    Some(PolicyViolation::new(
        DIRECT_FLIGHT,
        "Policy requires direct flights where available; itinerary includes connections",
    ))
}

fn preferred_airline(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    outside_preferences(
        ctx.draft.travel.airline.as_deref(),
        &ctx.policy.booking.preferred_airlines,
    )
    .map(|airline| {
        PolicyViolation::new(
            PREFERRED_AIRLINE,
            format!(
                "Airline '{airline}' is not a preferred carrier ({})",
                ctx.policy.booking.preferred_airlines.join(", ")
            ),
        )
    })
}

fn preferred_hotel(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    outside_preferences(
        ctx.draft.travel.hotel.as_deref(),
        &ctx.policy.accommodation.preferred_hotels,
    )
    .map(|hotel| {
        PolicyViolation::new(
            PREFERRED_HOTEL,
            format!(
                "Hotel '{hotel}' is not a preferred property ({})",
                ctx.policy.accommodation.preferred_hotels.join(", ")
            ),
        )
    })
}

fn accommodation_type(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    outside_preferences(
        ctx.draft.travel.accommodation_type.as_deref(),
        &ctx.policy.accommodation.preferred_types,
    )
    .map(|kind| {
        PolicyViolation::new(
            ACCOMMODATION_TYPE,
            format!(
                "Accommodation type '{kind}' is not permitted ({})",
                ctx.policy.accommodation.preferred_types.join(", ")
            ),
        )
    })
}

fn ground_transport(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let mode = ctx.draft.travel.ground_transport?;
    let allowed = &ctx.policy.transport.allowed_modes;
    if allowed.is_empty() || allowed.contains(&mode) {
        return None;
    }
    let permitted: Vec<&str> = allowed.iter().map(|mode| mode.label()).collect();
    Some(PolicyViolation::new(
        GROUND_TRANSPORT,
        format!(
            "Ground transport by {} is not permitted ({})",
            mode.label(),
            permitted.join(", ")
        ),
    ))
}

fn restricted_destination(ctx: &RuleContext<'_>) -> Option<PolicyViolation> {
    let destination = ctx.draft.destination.to_lowercase();
    ctx.policy
        .restricted_destinations
        .iter()
        .map(|keyword| keyword.trim())
        .find(|keyword| !keyword.is_empty() && destination.contains(&keyword.to_lowercase()))
        .map(|keyword| {
            PolicyViolation::new(
                RESTRICTED_DESTINATION,
                format!("Destination matches policy restricted location '{keyword}'"),
            )
        })
}

/// Returns the declared value when the policy lists preferences and the value is not one
/// of them.
fn outside_preferences<'a>(declared: Option<&'a str>, preferences: &[String]) -> Option<&'a str> {
    let declared = declared.map(str::trim).filter(|value| !value.is_empty())?;
    if preferences.is_empty()
        || preferences
            .iter()
            .any(|preferred| preferred.trim().eq_ignore_ascii_case(declared))
    {
        return None;
    }
    Some(declared)
}
