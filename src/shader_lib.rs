//! Shared WGSL snippets spliced into generated shaders.
//!
//! Materials concatenate the blocks they need into the fragment preamble
//! of their [`ShadeStyle`](crate::ShadeStyle). Everything here is plain
//! module-scope WGSL with no bindings, so the blocks compose in any order.

/// Microfacet BRDF terms used by the per-light shading fragments.
pub const BRDF_WGSL: &str = r#"
const PI = 3.14159265359;

fn pow5(x: f32) -> f32 {
    let x2 = x * x;
    return x2 * x2 * x;
}

fn D_GGX(roughness: f32, NoH: f32) -> f32 {
    let oneMinusNoHSquared = 1.0 - NoH * NoH;
    let a = NoH * roughness;
    let k = roughness / (oneMinusNoHSquared + a * a);
    return k * k * (1.0 / PI);
}

fn V_SmithGGXCorrelated(roughness: f32, NoV: f32, NoL: f32) -> f32 {
    let a2 = roughness * roughness;
    let lambdaV = NoL * sqrt((NoV - a2 * NoV) * NoV + a2);
    let lambdaL = NoV * sqrt((NoL - a2 * NoL) * NoL + a2);
    return 0.5 / (lambdaV + lambdaL);
}

fn F_Schlick3(f0: vec3f, f90: f32, VoH: f32) -> vec3f {
    return f0 + (vec3f(f90) - f0) * pow5(1.0 - VoH);
}

fn F_Schlick(f0: f32, f90: f32, VoH: f32) -> f32 {
    return f0 + (f90 - f0) * pow5(1.0 - VoH);
}

fn Fd_Burley(roughness: f32, NoV: f32, NoL: f32, LoH: f32) -> f32 {
    let f90 = 0.5 + 2.0 * roughness * LoH * LoH;
    let lightScatter = F_Schlick(1.0, f90, NoL);
    let viewScatter = F_Schlick(1.0, f90, NoV);
    return lightScatter * viewScatter * (1.0 / PI);
}

fn PrefilteredDFG_Karis(roughness: f32, NoV: f32) -> vec2f {
    let c0 = vec4f(-1.0, -0.0275, -0.572, 0.022);
    let c1 = vec4f(1.0, 0.0425, 1.040, -0.040);
    let r = roughness * c0 + c1;
    let a004 = min(r.x * r.x, exp2(-9.28 * NoV)) * r.x + r.y;
    return vec2f(-1.04, 1.04) * a004 + r.zw;
}

fn G1V(dotNV: f32, k: f32) -> f32 {
    return 1.0 / (dotNV * (1.0 - k) + k);
}

fn ggx(N: vec3f, V: vec3f, L: vec3f, roughness: f32, F0: f32) -> f32 {
    let alpha = roughness * roughness;
    let H = normalize(V + L);
    let dotNL = saturate(dot(N, L));
    let dotNV = saturate(dot(N, V));
    let dotNH = saturate(dot(N, H));
    let dotLH = saturate(dot(L, H));
    let alphaSqr = alpha * alpha;
    let denom = dotNH * dotNH * (alphaSqr - 1.0) + 1.0;
    let D = alphaSqr / (PI * denom * denom);
    let F = F0 + (1.0 - F0) * pow5(1.0 - dotLH);
    let k = alpha / 2.0;
    let vis = G1V(dotNL, k) * G1V(dotNV, k);
    return dotNL * D * F * vis;
}
"#;

/// Shadow-map helpers: a Poisson tap disk for PCF and the Chebyshev bound
/// for variance shadow maps. The actual texture fetches are generated per
/// light because WGSL functions cannot take texture bindings as arguments.
pub const SHADOW_WGSL: &str = r#"
const poissonTaps = array(
    vec2f(-0.94201624, -0.39906216),
    vec2f(0.94558609, -0.76890725),
    vec2f(-0.09418410, -0.92938870),
    vec2f(0.34495938, 0.29387760),
    vec2f(-0.91588581, 0.45771432),
    vec2f(-0.81544232, -0.87912464),
    vec2f(-0.38277543, 0.27676845),
    vec2f(0.97484398, 0.75648379),
    vec2f(0.44323325, -0.97511554),
    vec2f(0.53742981, -0.47373420),
    vec2f(-0.26496911, -0.41893023),
    vec2f(0.79197514, 0.19090188),
);

fn chebyshevUpperBound(moments: vec2f, depth: f32) -> f32 {
    var p = 0.0;
    if (depth <= moments.x) {
        p = 1.0;
    }
    var variance = moments.y - moments.x * moments.x;
    variance = max(variance, 0.0001);
    let d = depth - moments.x;
    let pMax = variance / (variance + d * d);
    return max(p, pMax);
}
"#;

/// Linearly transformed cosines for rectangular area lights.
///
/// The LUT fetches stay in generated code; these helpers cover the
/// coordinate mapping, the inverse-matrix reconstruction and the clipless
/// edge integration.
pub const LTC_WGSL: &str = r#"
const LTC_LUT_SCALE = 31.0 / 32.0;
const LTC_LUT_BIAS = 0.5 / 32.0;

fn ltcCoords(NoV: f32, roughness: f32) -> vec2f {
    let coords = vec2f(roughness, sqrt(1.0 - NoV));
    return coords * LTC_LUT_SCALE + vec2f(LTC_LUT_BIAS);
}

fn ltcMinv(t: vec4f) -> mat3x3f {
    return mat3x3f(
        vec3f(t.x, 0.0, t.y),
        vec3f(0.0, 1.0, 0.0),
        vec3f(t.z, 0.0, t.w),
    );
}

fn ltcIntegrateEdge(v1: vec3f, v2: vec3f) -> f32 {
    let x = dot(v1, v2);
    let y = abs(x);
    let a = 0.8543985 + (0.4965155 + 0.0145206 * y) * y;
    let b = 3.4175940 + (4.1616724 + y) * y;
    var theta_sintheta = a / b;
    if (x <= 0.0) {
        theta_sintheta = 0.5 * inverseSqrt(max(1.0 - x * x, 1e-7)) - theta_sintheta;
    }
    return cross(v1, v2).z * theta_sintheta;
}

fn ltcEvaluate(
    N: vec3f,
    V: vec3f,
    P: vec3f,
    Minv: mat3x3f,
    p0: vec3f,
    p1: vec3f,
    p2: vec3f,
    p3: vec3f,
    twoSided: bool,
) -> f32 {
    let T1 = normalize(V - N * dot(V, N));
    let T2 = cross(N, T1);
    let M = Minv * transpose(mat3x3f(T1, T2, N));
    let L0 = normalize(M * (p0 - P));
    let L1 = normalize(M * (p1 - P));
    let L2 = normalize(M * (p2 - P));
    let L3 = normalize(M * (p3 - P));
    var sum = 0.0;
    sum += ltcIntegrateEdge(L0, L1);
    sum += ltcIntegrateEdge(L1, L2);
    sum += ltcIntegrateEdge(L2, L3);
    sum += ltcIntegrateEdge(L3, L0);
    if (twoSided) {
        sum = abs(sum);
    } else {
        sum = max(0.0, sum);
    }
    return sum;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brdf_block_defines_every_term_the_light_fragments_use() {
        for name in [
            "fn pow5(",
            "fn D_GGX(",
            "fn V_SmithGGXCorrelated(",
            "fn F_Schlick3(",
            "fn Fd_Burley(",
            "fn PrefilteredDFG_Karis(",
            "fn ggx(",
        ] {
            assert!(BRDF_WGSL.contains(name), "missing {name}");
        }
    }

    #[test]
    fn pcf_disk_has_twelve_taps() {
        assert_eq!(SHADOW_WGSL.matches("vec2f(").count(), 12);
        assert!(SHADOW_WGSL.contains("fn chebyshevUpperBound("));
    }

    #[test]
    fn ltc_block_matches_the_lut_dimensions() {
        assert!(LTC_WGSL.contains("31.0 / 32.0"));
        assert!(LTC_WGSL.contains("0.5 / 32.0"));
        assert!(LTC_WGSL.contains("fn ltcEvaluate("));
    }
}
