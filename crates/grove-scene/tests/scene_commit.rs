// SPDX-License-Identifier: CEPL-1.0
use grove_render::{Model, SceneSource, TextureSlot};
use grove_scene::{Scene, Texture};

#[test]
fn commit_decodes_textures_from_disk() {
    let dir = std::env::temp_dir().join(format!("grove-scene-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("albedo.png");
    image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let mut scene = Scene::new("disk", "s.vert", "s.frag");
    let id = scene.create_object();
    let entry = scene.asset_mut(id).unwrap();
    entry.model = Model::cube_uv(1.0, 1.0, 1.0);
    entry.set_texture(TextureSlot::Albedo, Texture::from_path(&path));

    assert!(scene.texture(id, TextureSlot::Albedo).is_none());
    scene.commit().unwrap();

    let px = scene.texture(id, TextureSlot::Albedo).unwrap();
    assert_eq!((px.width(), px.height()), (3, 2));
    assert_eq!(&px.pixels()[..4], &[10, 20, 30, 255]);
    assert_eq!(scene.drawable_objects(), &[id]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn failed_decode_leaves_generation_untouched() {
    let mut scene = Scene::new("bad", "s.vert", "s.frag");
    let id = scene.create_object();
    scene
        .asset_mut(id)
        .unwrap()
        .set_texture(TextureSlot::Albedo, Texture::from_path("missing.png"));

    assert!(scene.commit().is_err());
    assert_eq!(scene.generation(), 0);
}
