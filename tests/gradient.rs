use bevy::color::Color;

use bevy_sunshine_analysis::ColorGradient;

use _harness::{
    backend,
    block,
    daylight_window,
    run_to_completion,
    settings,
    started_engine,
};



fn blue_to_red() -> ColorGradient {
    let mut gradient = ColorGradient::empty();
    assert!(gradient.insert(0.0, Color::srgb(0.0, 0.0, 1.0), false));
    assert!(gradient.insert(1.0, Color::srgb(1.0, 0.0, 0.0), false));
    gradient
}


#[test]
fn inserted_stops_are_retrievable() {
    let gradient = blue_to_red();
    assert_eq!(gradient.get_item(0), Some((0.0, Color::srgb(0.0, 0.0, 1.0))));
    assert_eq!(gradient.get_item(1), Some((1.0, Color::srgb(1.0, 0.0, 0.0))));
    assert_eq!(gradient.get_item(2), None);
    assert!(gradient.is_usable());
}

#[test]
fn insertion_order_does_not_matter() {
    let mut reversed = ColorGradient::empty();
    reversed.insert(1.0, Color::srgb(1.0, 0.0, 0.0), false);
    reversed.insert(0.0, Color::srgb(0.0, 0.0, 1.0), false);

    assert!(reversed.equals(&blue_to_red()));
    assert_eq!(reversed.image(), blue_to_red().image());

    reversed.insert(0.5, Color::srgb(0.0, 1.0, 0.0), false);
    assert!(!reversed.equals(&blue_to_red()));
}

#[test]
fn committed_gradient_recolors_without_rebuilding() {
    let mut engine = started_engine(backend(), settings(100.0, daylight_window()), block(0.0, 0.0));
    run_to_completion(&mut engine);
    let generation = engine.generation();

    let gradient = blue_to_red();
    engine.set_color_gradient(gradient.clone()).unwrap();
    assert!(!engine.commit().unwrap());
    assert_eq!(engine.generation(), generation);

    let red = gradient.sample(1.0);
    assert_eq!(red, [255, 0, 0, 255]);
    for layer in engine.visualization() {
        assert!(layer.colors().iter().all(|&color| color == red));
    }
}
