//! CAPTCHA image generation.
//!
//! Generates random alphanumeric answers and renders them as noisy SVG.

use base64::{Engine, engine::general_purpose::STANDARD};
use captcha_common::{CaptchaError, CaptchaRecord};
use rand::Rng;

use super::hash_answer;
use crate::db::CaptchaStore;

/// A freshly issued challenge
#[derive(Debug, Clone)]
pub struct IssuedCaptcha {
    pub id: String,
    /// Plain answer; never leaves the server except inside the image
    pub answer: String,
    /// `data:image/svg+xml;base64,...`
    pub image_data: String,
    pub expires_at: i64,
}

/// CAPTCHA generator service
pub struct CaptchaGenerator {
    /// Characters per answer
    length: usize,
    /// Challenge validity in seconds
    validity_secs: u64,
}

impl CaptchaGenerator {
    pub fn new(length: usize, validity_secs: u64) -> Self {
        Self {
            length: length.max(1),
            validity_secs,
        }
    }

    /// Generate a challenge and persist it
    pub async fn issue(&self, store: &CaptchaStore) -> Result<IssuedCaptcha, CaptchaError> {
        let id = generate_challenge_id();
        let answer = self.generate_answer();
        let svg = self.render_svg(&answer);

        let record = CaptchaRecord {
            answer_hash: hash_answer(&id, &answer),
            id: id.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        store.insert(&record, &svg).await?;

        tracing::debug!(challenge_id = %id, "Generated CAPTCHA challenge");

        Ok(IssuedCaptcha {
            expires_at: record.expires_at(self.validity_secs),
            image_data: svg_data_uri(&svg),
            answer,
            id,
        })
    }

    fn generate_answer(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| {
                let idx = rng.random_range(0..36u8);
                if idx < 10 {
                    (b'0' + idx) as char
                } else {
                    (b'A' + idx - 10) as char
                }
            })
            .collect()
    }

    /// Render the answer as an SVG with line noise and jittered glyphs
    pub fn render_svg(&self, text: &str) -> String {
        let mut rng = rand::rng();

        let width = 40 * (text.len() as i32 + 1);
        let height = 80;
        let noise_count = 6 * text.len();

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
            width, height
        );

        svg.push_str(r##"<rect width="100%" height="100%" fill="#1a1a2e"/>"##);

        for _ in 0..noise_count {
            let x1 = rng.random_range(0..width);
            let y1 = rng.random_range(0..height);
            let x2 = rng.random_range(0..width);
            let y2 = rng.random_range(0..height);
            let opacity = rng.random_range(20..50);
            svg.push_str(&format!(
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="rgba(255,255,255,0.{})" stroke-width="1"/>"#,
                x1, y1, x2, y2, opacity
            ));
        }

        let char_width = width as f32 / (text.len() as f32 + 1.0);
        for (i, c) in text.chars().enumerate() {
            let x = char_width * (i as f32 + 0.8);
            let y = 50 + rng.random_range(-10..10);
            let rotation = rng.random_range(-15..15);
            let color = format!(
                "rgb({},{},{})",
                rng.random_range(150..255),
                rng.random_range(150..255),
                rng.random_range(150..255)
            );

            svg.push_str(&format!(
                r#"<text x="{}" y="{}" font-family="monospace" font-size="32" font-weight="bold" fill="{}" transform="rotate({} {} {})">{}</text>"#,
                x, y, color, rotation, x, y, c
            ));
        }

        svg.push_str("</svg>");
        svg
    }
}

fn svg_data_uri(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

/// Generate a cryptographically random challenge ID
pub(crate) fn generate_challenge_id() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_pool;

    #[test]
    fn test_generate_answer() {
        let generator = CaptchaGenerator::new(5, 300);
        let answer = generator.generate_answer();
        assert_eq!(answer.len(), 5);
        assert!(answer.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_render_contains_every_glyph() {
        let generator = CaptchaGenerator::new(4, 300);
        let svg = generator.render_svg("AB12");
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        for c in ['A', 'B', '1', '2'] {
            assert!(svg.contains(&format!(">{}</text>", c)));
        }
    }

    #[test]
    fn test_challenge_ids_are_unique() {
        let a = generate_challenge_id();
        let b = generate_challenge_id();
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_persists_hashed_answer() {
        let store = CaptchaStore::new(memory_pool().await);
        let generator = CaptchaGenerator::new(6, 300);

        let issued = generator.issue(&store).await.unwrap();
        assert!(issued.image_data.starts_with("data:image/svg+xml;base64,"));

        let record = store.find(&issued.id).await.unwrap().unwrap();
        assert_eq!(record.answer_hash, hash_answer(&issued.id, &issued.answer));
        assert_ne!(record.answer_hash, issued.answer);
        assert_eq!(issued.expires_at, record.created_at + 300);
    }
}
