use anyhow::{anyhow, Result};

/// Cut a `width x height` window at `(x, y)` out of a packed RGBA8 buffer
/// that is `src_width x src_height`.
#[cfg_attr(not(feature = "capture-xcap"), allow(dead_code))]
pub(crate) fn crop_rgba(
    pixels: &[u8],
    src_width: u32,
    src_height: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let expected = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| anyhow!("RGBA frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGBA frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    if width == 0 || height == 0 {
        return Err(anyhow!("crop window is empty"));
    }
    let fits_x = x.checked_add(width).is_some_and(|r| r <= src_width);
    let fits_y = y.checked_add(height).is_some_and(|b| b <= src_height);
    if !fits_x || !fits_y {
        return Err(anyhow!(
            "crop window {}x{}+{}+{} exceeds {}x{} capture",
            width,
            height,
            x,
            y,
            src_width,
            src_height
        ));
    }

    let stride = src_width as usize * 4;
    let row_len = width as usize * 4;
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in y as usize..(y + height) as usize {
        let start = row * stride + x as usize * 4;
        out.extend_from_slice(&pixels[start..start + row_len]);
    }
    Ok(out)
}
