/// PID with a clamped integral term
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    integral_limit: f32,
    integral: f32,
    prev_error: Option<f32>,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32, integral_limit: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit: integral_limit.abs(),
            integral: 0.0,
            prev_error: None,
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    pub fn compute(&mut self, error: f32, dt: f32) -> f32 {
        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);

        // No derivative kick on the first sample after a reset
        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        (self.kp * error) + (self.ki * self.integral) + (self.kd * derivative)
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }
}
